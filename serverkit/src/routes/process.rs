use crate::{algorithm::Algorithm, error::ServerResult, server::AlgorithmServer};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Json,
};
use serde_json::Value;
use serverkit_proto::EncodedResult;
use std::{sync::Arc, time::Instant};
use tracing::instrument;

#[instrument(skip(server, payload))]
pub async fn process<A: Algorithm>(
    State(server): State<Arc<AlgorithmServer<A>>>,
    Path(algorithm): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ServerResult<Json<Vec<EncodedResult>>> {
    server.ensure_serves(&algorithm)?;
    let Json(payload) = payload?;

    let started = Instant::now();
    let results = tokio::task::spawn_blocking(move || server.process(&payload)).await??;

    tracing::debug!(
        "Returning {} results in {} ms",
        results.len(),
        started.elapsed().as_millis()
    );
    for (i, result) in results.iter().enumerate() {
        tracing::debug!("Result {}: kind={}, shape={:?}", i, result.kind, result.data.shape());
    }

    Ok(Json(results.iter().map(EncodedResult::from).collect()))
}
