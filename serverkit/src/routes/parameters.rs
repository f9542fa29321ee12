use crate::{algorithm::Algorithm, error::ServerResult, server::AlgorithmServer};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

#[instrument(skip(server))]
pub async fn parameters<A: Algorithm>(
    State(server): State<Arc<AlgorithmServer<A>>>,
    Path(algorithm): Path<String>,
) -> ServerResult<Json<Value>> {
    server.ensure_serves(&algorithm)?;
    Ok(Json(server.algorithm().schema().json_schema()))
}
