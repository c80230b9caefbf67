use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use mlops_core::error::Result;
use mlops_core::{
    train_and_log, ArtifactSchema, HyperParams, LoadedModel, LocalRegistry, ModelVersion, Predictor, Registry, RunId,
    ServerConfig, ServingPhase, ServingState, Stage, SyntheticRegression, TrainingRequest, VersionSelector,
};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Returns `1.0, 2.0, ...` for each row and expects ten features.
#[derive(Debug)]
struct Counting(ArtifactSchema);

impl Predictor for Counting {
    fn model_type(&self) -> &str { "Counting" }
    fn schema(&self) -> &ArtifactSchema { &self.0 }
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> { Ok((1..=rows.len()).map(|i| i as f64).collect()) }
}

/// Returns one value regardless of how many rows it is given.
#[derive(Debug)]
struct Single(ArtifactSchema);

impl Predictor for Single {
    fn model_type(&self) -> &str { "Single" }
    fn schema(&self) -> &ArtifactSchema { &self.0 }
    fn predict(&self, _rows: &[Vec<f64>]) -> Result<Vec<f64>> { Ok(vec![0.0]) }
}

fn version(v: u64) -> ModelVersion {
    ModelVersion { name: "m".into(), version: v, run_id: RunId::from("abc123"), artifact_path: "model".into(), stage: Stage::Staging, created_at: Utc::now(), last_updated_at: Utc::now() }
}

fn ready_app(schema: ArtifactSchema) -> Router {
    let mut st = ServingState::new();
    st.begin_loading().unwrap();
    st.complete(LoadedModel { version: version(4), predictor: Arc::new(Counting(schema)) }).unwrap();
    model_server::router(Arc::new(st))
}

fn ten_wide() -> ArtifactSchema { ArtifactSchema { feature_count: Some(10), feature_names: None } }

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => req.header("content-type", "application/json").body(Body::from(b.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn two_rows() -> Value {
    json!({ "data": [
        [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0],
        [2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0]
    ]})
}

#[tokio::test]
async fn predict_returns_one_value_per_row_in_order() {
    let app = ready_app(ten_wide());
    let (status, body) = call(&app, "POST", "/predict", Some(two_rows())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"], json!([1.0, 2.0]));
    assert_eq!(body["model_version"], "4");
}

#[tokio::test]
async fn width_mismatch_is_400_and_does_not_poison_later_requests() {
    let app = ready_app(ten_wide());
    let (status, body) = call(&app, "POST", "/predict", Some(json!({ "data": [[1.0, 2.0, 3.0]] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("expects 10"));
    let (status, body) = call(&app, "POST", "/predict", Some(two_rows())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn malformed_payloads_are_caller_errors() {
    let app = ready_app(ten_wide());
    let (status, _) = call(&app, "POST", "/predict", Some(json!({ "data": [["a", "b"]] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, "POST", "/predict", Some(json!({ "data": [[1.0, 2.0], [1.0]] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let mut bad_names = two_rows();
    bad_names["feature_names"] = json!(["a", "b"]);
    let (status, _) = call(&app, "POST", "/predict", Some(bad_names)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_prediction_count_is_a_server_fault() {
    let mut st = ServingState::new();
    st.begin_loading().unwrap();
    st.complete(LoadedModel { version: version(4), predictor: Arc::new(Single(ten_wide())) }).unwrap();
    let app = model_server::router(Arc::new(st));
    let (status, body) = call(&app, "POST", "/predict", Some(two_rows())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("1 predictions for 2 rows"), "{body}");
}

#[tokio::test]
async fn not_ready_refuses_traffic_but_stays_healthy() {
    let app = model_server::router(Arc::new(ServingState::new()));
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy", "model_loaded": false }));
    assert_eq!(call(&app, "GET", "/ready", None).await.0, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(call(&app, "POST", "/predict", Some(two_rows())).await.0, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(call(&app, "GET", "/model-info", None).await.0, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn ready_and_health_agree_with_state() {
    let app = ready_app(ten_wide());
    let (status, body) = call(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ready", "model_version": "4" }));
    assert_eq!(call(&app, "GET", "/health", None).await.1["model_loaded"], true);
}

#[tokio::test]
async fn model_info_reports_unknown_width() {
    let app = ready_app(ArtifactSchema { feature_count: None, feature_names: None });
    let (status, body) = call(&app, "GET", "/model-info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "model_version": "4", "model_type": "Counting", "feature_count": "unknown" }));
    let (_, body) = call(&ready_app(ten_wide()), "GET", "/model-info", None).await;
    assert_eq!(body["feature_count"], 10);
}

#[tokio::test]
async fn failed_load_is_observable() {
    let reg = LocalRegistry::temporary().unwrap();
    let st = model_server::load(&reg, "missing", VersionSelector::Latest).await;
    assert_eq!(st.phase(), ServingPhase::Failed);
    let app = model_server::router(Arc::new(st));
    assert_eq!(call(&app, "GET", "/health", None).await.1["model_loaded"], false);
    let (status, body) = call(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn bad_startup_config_fails_the_load_instead_of_the_process() {
    let cfg = ServerConfig { registry_uri: "memory://".into(), model_version: "lastest".into(), ..Default::default() };
    let st = model_server::load_configured(&cfg).await;
    assert_eq!(st.phase(), ServingPhase::Failed);
    let app = model_server::router(Arc::new(st));
    assert_eq!(call(&app, "GET", "/health", None).await.0, StatusCode::OK);
    let (status, body) = call(&app, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().contains("lastest"), "{body}");

    let cfg = ServerConfig { registry_uri: "ftp://nowhere".into(), ..Default::default() };
    let st = model_server::load_configured(&cfg).await;
    assert_eq!(st.phase(), ServingPhase::Failed);
    assert!(st.failure().unwrap().contains("ftp://nowhere"), "{:?}", st.failure());
}

#[tokio::test]
async fn serves_a_trained_model_end_to_end() {
    let reg = LocalRegistry::temporary().unwrap();
    let req = TrainingRequest { experiment: "e2e".into(), params: HyperParams { tree_count: 5, max_depth: 4 }, register_as: Some("rf".into()) };
    let source = SyntheticRegression { samples: 200, ..Default::default() };
    let first = train_and_log(&reg, &source, &req).await.unwrap();
    train_and_log(&reg, &source, &req).await.unwrap();

    let st = model_server::load(&reg, "rf", VersionSelector::Version(first.version.unwrap().version)).await;
    assert!(st.is_ready());
    let app = model_server::router(Arc::new(st));
    assert_eq!(call(&app, "GET", "/ready", None).await.1["model_version"], "1");

    let names: Vec<String> = (0..10).rev().map(|i| format!("feature_{i}")).collect();
    let (status, body) = call(&app, "POST", "/predict", Some(json!({ "data": two_rows()["data"], "feature_names": names }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 2);

    let (_, info) = call(&app, "GET", "/model-info", None).await;
    assert_eq!(info, json!({ "model_version": "1", "model_type": "RandomForestRegressor", "feature_count": 10 }));
    assert_eq!(reg.resolve("rf", VersionSelector::Latest).await.unwrap().version, 2);
}
