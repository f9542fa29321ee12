use crate::{algorithm::Algorithm, error::ServerResult, server::AlgorithmServer};
use axum::{
    extract::{Path, State},
    response::Json,
};
use serverkit_proto::{encode_array, SampleImagesResponse};
use std::sync::Arc;
use tracing::instrument;

#[instrument(skip(server))]
pub async fn sample_images<A: Algorithm>(
    State(server): State<Arc<AlgorithmServer<A>>>,
    Path(algorithm): Path<String>,
) -> ServerResult<Json<SampleImagesResponse>> {
    server.ensure_serves(&algorithm)?;

    let samples = tokio::task::spawn_blocking(move || server.sample_images()).await??;

    Ok(Json(SampleImagesResponse {
        sample_images: samples.iter().map(encode_array).collect(),
    }))
}
