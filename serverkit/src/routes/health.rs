use axum::{response::IntoResponse, response::Json};
use serverkit_proto::HealthStatus;

pub async fn healthcheck() -> impl IntoResponse {
    Json(HealthStatus {
        status: "Available".into(),
    })
}
