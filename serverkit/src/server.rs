use crate::{
    algorithm::{run_checked, Algorithm},
    config::{Config, ServerConfig},
    error::{ServerError, ServerResult},
    routes::{api_routes, not_found},
    schema::ValidationError,
    threshold::ThresholdAlgorithm,
};
use axum::{extract::DefaultBodyLimit, Router};
use ndarray::ArrayD;
use serde_json::Value;
use serverkit_proto::AlgorithmResult;
use std::{future::Future, net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;

/// A single algorithm bound to the HTTP contract. Built once at start-up and
/// shared with handlers through router state.
pub struct AlgorithmServer<A: Algorithm> {
    algorithm: A,
}

impl<A: Algorithm> AlgorithmServer<A> {
    pub fn new(algorithm: A) -> Result<Self, ValidationError> {
        algorithm.schema().check_defaults()?;
        Ok(Self { algorithm })
    }

    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn name(&self) -> &str {
        self.algorithm.name()
    }

    pub fn ensure_serves(&self, name: &str) -> ServerResult<()> {
        if name == self.name() {
            Ok(())
        } else {
            Err(ServerError::UnknownAlgorithm(name.to_string()))
        }
    }

    pub fn process(&self, payload: &Value) -> ServerResult<Vec<AlgorithmResult>> {
        let params = self.algorithm.validate(payload)?;
        Ok(run_checked(&self.algorithm, &params)?)
    }

    pub fn sample_images(&self) -> ServerResult<Vec<ArrayD<f32>>> {
        Ok(self.algorithm.load_samples()?)
    }
}

pub fn build_router<A: Algorithm>(
    server: Arc<AlgorithmServer<A>>,
    max_body_bytes: usize,
) -> Router {
    Router::new()
        .merge(api_routes::<A>())
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<A: Algorithm>(
        server: Arc<AlgorithmServer<A>>,
        config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let router = build_router(server, config.max_body_bytes);
        let listener = TcpListener::bind(config.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let algorithm = ThresholdAlgorithm::from_config(&config.algorithm);
    let server = Arc::new(AlgorithmServer::new(algorithm)?);
    tracing::info!(
        "Serving algorithm {} with samples from {:?}",
        server.name(),
        config.algorithm.sample_dir
    );

    let http_server = HttpServer::new(server, &config.server).await?;
    http_server.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
