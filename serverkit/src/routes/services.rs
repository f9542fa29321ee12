use crate::{algorithm::Algorithm, server::AlgorithmServer};
use axum::{extract::State, response::Json};
use serverkit_proto::ServicesResponse;
use std::sync::Arc;

pub async fn services<A: Algorithm>(
    State(server): State<Arc<AlgorithmServer<A>>>,
) -> Json<ServicesResponse> {
    Json(ServicesResponse {
        services: vec![server.name().to_string()],
    })
}
