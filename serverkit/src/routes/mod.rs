mod health;
mod parameters;
mod process;
mod sample_images;
mod services;

use crate::{algorithm::Algorithm, error::ServerError, server::AlgorithmServer};
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serverkit_proto::ServerInfo;
use std::sync::Arc;

pub use health::healthcheck;
pub use parameters::parameters;
pub use process::process;
pub use sample_images::sample_images;
pub use services::services;

pub fn api_routes<A: Algorithm>() -> Router<Arc<AlgorithmServer<A>>> {
    Router::new()
        .route("/", get(server_info::<A>))
        .route("/health", get(healthcheck))
        .route("/services", get(services::<A>))
        .route("/{algorithm}/parameters", get(parameters::<A>))
        .route("/{algorithm}/process", post(process::<A>))
        .route("/{algorithm}/sample_images", get(sample_images::<A>))
}

pub async fn server_info<A: Algorithm>(
    State(server): State<Arc<AlgorithmServer<A>>>,
) -> Json<ServerInfo> {
    Json(ServerInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        algorithm: server.name().to_string(),
    })
}

pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
