use crate::request::RunRequest;
use ndarray::ArrayD;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serverkit_proto::{
    decode_array, AlgorithmResult, CodecError, EncodedResult, ErrorResponse, FieldIssue,
    SampleImagesResponse, ServicesResponse,
};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::instrument;

const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Maximum connection retries exceeded.")]
    MaxRetriesExceeded,
    #[error("Server did not become ready within {0:?}")]
    NotReady(Duration),
    #[error("Server returned {status} ({code}): {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
        details: Vec<FieldIssue>,
    },
    #[error("No algorithm available")]
    NoAlgorithm,
    #[error("Several algorithms available, pick one of {0:?}")]
    AmbiguousAlgorithm(Vec<String>),
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// HTTP binding to an algorithm server.
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    algorithms: Vec<String>,
}

impl Client {
    /// Connects and lists the served algorithms, retrying with jittered
    /// exponential backoff while the server is unreachable.
    pub async fn connect(server_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::new();
        let base_url = server_url.trim_end_matches('/').to_string();
        let algorithms = Self::fetch_services(&http, &base_url).await?;

        tracing::info!("Connected to {} serving {:?}", base_url, algorithms);

        Ok(Self {
            http,
            base_url,
            algorithms,
        })
    }

    async fn fetch_services(
        http: &reqwest::Client,
        base_url: &str,
    ) -> Result<Vec<String>, ClientError> {
        let mut retry_delay = Duration::from_millis(50);
        let max_retry_delay = Duration::from_secs(1);
        let max_retries = 10;
        let mut retry_count = 0;
        let url = format!("{}/services", base_url);

        while retry_count < max_retries {
            match timeout(Duration::from_secs(1), http.get(&url).send()).await {
                Ok(Ok(response)) => {
                    let services: ServicesResponse = parse_response(response).await?;
                    return Ok(services.services);
                }
                Ok(Err(e)) => {
                    tracing::error!("Failed to reach algorithm server: {:?}", e);
                }
                Err(_) => {
                    tracing::error!("Connection timeout");
                }
            }

            retry_count += 1;
            let jitter = rand::random::<f32>() * 0.2 + 0.9;
            sleep(retry_delay.mul_f32(jitter)).await;
            retry_delay = (retry_delay * 2).min(max_retry_delay);
        }

        Err(ClientError::MaxRetriesExceeded)
    }

    pub fn algorithms(&self) -> &[String] {
        &self.algorithms
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `None` selects the only served algorithm.
    fn resolve_algorithm(&self, algorithm: Option<&str>) -> Result<String, ClientError> {
        match algorithm {
            Some(name) if self.algorithms.iter().any(|a| a == name) => Ok(name.to_string()),
            Some(name) => Err(ClientError::UnknownAlgorithm(name.to_string())),
            None => match self.algorithms.as_slice() {
                [] => Err(ClientError::NoAlgorithm),
                [only] => Ok(only.clone()),
                many => Err(ClientError::AmbiguousAlgorithm(many.to_vec())),
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn get_algorithm_parameters(
        &self,
        algorithm: Option<&str>,
    ) -> Result<Value, ClientError> {
        let algorithm = self.resolve_algorithm(algorithm)?;
        let response = self
            .http
            .get(format!("{}/{}/parameters", self.base_url, algorithm))
            .send()
            .await?;

        parse_response(response).await
    }

    #[instrument(skip(self))]
    pub async fn get_sample_images(
        &self,
        algorithm: Option<&str>,
        first_only: bool,
    ) -> Result<Vec<ArrayD<f32>>, ClientError> {
        let algorithm = self.resolve_algorithm(algorithm)?;
        let response = self
            .http
            .get(format!("{}/{}/sample_images", self.base_url, algorithm))
            .send()
            .await?;
        let samples: SampleImagesResponse = parse_response(response).await?;

        let count = if first_only { 1 } else { samples.sample_images.len() };
        samples
            .sample_images
            .iter()
            .take(count)
            .map(|encoded| decode_array(encoded).map_err(ClientError::from))
            .collect()
    }

    #[instrument(skip(self, request))]
    pub async fn run_algorithm(
        &self,
        algorithm: Option<&str>,
        request: &RunRequest,
    ) -> Result<Vec<AlgorithmResult>, ClientError> {
        let algorithm = self.resolve_algorithm(algorithm)?;
        let response = self
            .http
            .post(format!("{}/{}/process", self.base_url, algorithm))
            .json(request.as_json())
            .send()
            .await?;
        let results: Vec<EncodedResult> = parse_response(response).await?;

        tracing::debug!("Received {} results", results.len());
        results
            .into_iter()
            .map(|result| result.decode().map_err(ClientError::from))
            .collect()
    }
}

/// Polls `/health` until it answers with a success status or `deadline`
/// elapses.
pub async fn wait_until_ready(server_url: &str, deadline: Duration) -> Result<(), ClientError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()?;
    let url = format!("{}/health", server_url.trim_end_matches('/'));

    let poll = async {
        loop {
            match http.get(&url).send().await {
                Ok(response) if response.status().is_success() => return,
                Ok(response) => tracing::debug!("Server not ready: {}", response.status()),
                Err(e) => tracing::debug!("Server not reachable: {}", e),
            }
            sleep(HEALTH_POLL_INTERVAL).await;
        }
    };

    timeout(deadline, poll)
        .await
        .map_err(|_| ClientError::NotReady(deadline))
}

async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await?;
    let (code, message, details) = match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(ErrorResponse { error }) => (error.code, error.message, error.details.unwrap_or_default()),
        Err(_) => ("HTTP_ERROR".to_string(), body, Vec::new()),
    };

    Err(ClientError::Server {
        status: status.as_u16(),
        code,
        message,
        details,
    })
}
