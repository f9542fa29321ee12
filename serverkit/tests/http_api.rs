use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use image::{ImageBuffer, Luma};
use ndarray::Array;
use serde_json::{json, Value};
use serverkit::{
    build_router, config::DEFAULT_MAX_BODY_BYTES, samples::SampleError, Algorithm,
    AlgorithmError, AlgorithmServer, ParamValues, ParameterSchema, ThresholdAlgorithm,
    ValidationError,
};
use serverkit_proto::{decode_array, encode_array, AlgorithmResult, EncodedResult, ResultKind};
use std::{path::Path, sync::Arc};
use tower::ServiceExt;

fn router(sample_dir: &Path) -> Router {
    router_with_limit(sample_dir, DEFAULT_MAX_BODY_BYTES)
}

fn router_with_limit(sample_dir: &Path, max_body_bytes: usize) -> Router {
    let server = AlgorithmServer::new(ThresholdAlgorithm::new("threshold", sample_dir)).unwrap();
    build_router(Arc::new(server), max_body_bytes)
}

struct FailingAlgorithm {
    schema: ParameterSchema,
}

impl Algorithm for FailingAlgorithm {
    type Params = ();

    fn name(&self) -> &str {
        "failing"
    }

    fn schema(&self) -> &ParameterSchema {
        &self.schema
    }

    fn parse(&self, _values: ParamValues) -> Result<(), ValidationError> {
        Ok(())
    }

    fn run(&self, _params: &()) -> Result<Vec<AlgorithmResult>, AlgorithmError> {
        Err(AlgorithmError::Failed("model weights missing".into()))
    }

    fn load_samples(&self) -> Result<Vec<ndarray::ArrayD<f32>>, SampleError> {
        Ok(Vec::new())
    }
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_and_services() {
    let dir = tempfile::tempdir().unwrap();

    let (status, body) = send(router(dir.path()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "Available"}));

    let (status, body) = send(router(dir.path()), get("/services")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"services": ["threshold"]}));

    let (_, body) = send(router(dir.path()), get("/")).await;
    assert_eq!(body["algorithm"], json!("threshold"));
}

#[tokio::test]
async fn test_parameters_schema() {
    let dir = tempfile::tempdir().unwrap();

    let (status, body) = send(router(dir.path()), get("/threshold/parameters")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["required"], json!(["image"]));
    assert_eq!(body["properties"]["threshold"]["default"], json!(0.5));
}

#[tokio::test]
async fn test_process_returns_encoded_labels() {
    let dir = tempfile::tempdir().unwrap();
    let image = Array::from_shape_fn((5, 4), |(y, x)| (y * 4 + x) as f32).into_dyn();
    let payload = json!({ "image": encode_array(&image), "model_name": "model1", "threshold": 0.5 });

    let (status, body) = send(router(dir.path()), post_json("/threshold/process", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    let results: Vec<EncodedResult> = serde_json::from_value(body).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].kind, ResultKind::Labels);

    let labels = decode_array(&results[0].data).unwrap();
    assert_eq!(labels.shape(), &[5, 4]);
    assert_eq!(labels[[0, 0]], 0.0);
    assert_eq!(labels[[0, 1]], 1.0);
}

#[tokio::test]
async fn test_process_reports_field_errors() {
    let dir = tempfile::tempdir().unwrap();
    let payload = json!({
        "image": encode_array(&Array::<f32, _>::zeros(4).into_dyn()),
        "model_name": "model3",
        "threshold": -1.0,
    });

    let (status, body) = send(router(dir.path()), post_json("/threshold/process", &payload)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|detail| detail["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["image", "model_name", "threshold"]);
}

#[tokio::test]
async fn test_process_rejects_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/threshold/process")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(router(dir.path()), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("BAD_REQUEST"));
}

#[tokio::test]
async fn test_unknown_algorithm_and_route() {
    let dir = tempfile::tempdir().unwrap();

    let (status, body) = send(router(dir.path()), get("/other/parameters")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("UNKNOWN_ALGORITHM"));

    let (status, _) = send(router(dir.path()), get("/a/b/c")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sample_images() {
    let dir = tempfile::tempdir().unwrap();

    let (status, body) = send(router(dir.path()), get("/threshold/sample_images")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], json!("SAMPLES_UNAVAILABLE"));

    ImageBuffer::<Luma<u8>, Vec<u8>>::from_pixel(3, 2, Luma([7]))
        .save(dir.path().join("sample.png"))
        .unwrap();

    let (status, body) = send(router(dir.path()), get("/threshold/sample_images")).await;
    assert_eq!(status, StatusCode::OK);
    let samples = body["sample_images"].as_array().unwrap();
    assert_eq!(samples.len(), 1);
    let sample = decode_array(samples[0].as_str().unwrap()).unwrap();
    assert_eq!(sample.shape(), &[2, 3]);
    assert_eq!(sample[[1, 2]], 7.0);
}

#[tokio::test]
async fn test_process_accepts_megapixel_image() {
    let dir = tempfile::tempdir().unwrap();
    let image = Array::<f32, _>::zeros((1024, 1024)).into_dyn();
    let payload = json!({ "image": encode_array(&image), "threshold": 0.5 });
    assert!(payload.to_string().len() > 2 * 1024 * 1024);

    let (status, body) = send(router(dir.path()), post_json("/threshold/process", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    let results: Vec<EncodedResult> = serde_json::from_value(body).unwrap();
    assert_eq!(decode_array(&results[0].data).unwrap().shape(), &[1024, 1024]);
}

#[tokio::test]
async fn test_process_rejects_body_over_limit() {
    let dir = tempfile::tempdir().unwrap();
    let image = Array::<f32, _>::zeros((64, 64)).into_dyn();
    let payload = json!({ "image": encode_array(&image) });

    let (status, body) = send(
        router_with_limit(dir.path(), 1024),
        post_json("/threshold/process", &payload),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], json!("PAYLOAD_TOO_LARGE"));
}

#[tokio::test]
async fn test_algorithm_failure_is_internal_error() {
    let server = AlgorithmServer::new(FailingAlgorithm {
        schema: ParameterSchema::new("Parameters"),
    })
    .unwrap();
    let router = build_router(Arc::new(server), DEFAULT_MAX_BODY_BYTES);

    let (status, body) = send(router, post_json("/failing/process", &json!({}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], json!("ALGORITHM_ERROR"));
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("model weights missing"));
}
