//! HTTP surface: `/health`, `/ready`, `/predict`, `/model-info`, `/metrics`.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mlops_core::{Error, FeatureFrame, ServingState};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{error, warn};

use crate::metrics;

pub type AppState = Arc<ServingState>;

#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    pub data: Vec<Vec<f64>>,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<f64>,
    pub model_version: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse { pub status: &'static str, pub model_loaded: bool }

#[derive(Debug, Serialize)]
pub struct ReadyResponse { pub status: &'static str, pub model_version: String }

/// Declared input width, or the literal `"unknown"` when the artifact does not declare one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureCount { Known(usize), Unknown }

impl Serialize for FeatureCount {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self { FeatureCount::Known(n) => s.serialize_u64(*n as u64), FeatureCount::Unknown => s.serialize_str("unknown") }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelInfoResponse {
    pub model_version: String,
    pub model_type: String,
    pub feature_count: FeatureCount,
}

/// Maps the error taxonomy onto status codes: caller faults 400, not-ready 503, everything else 500.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self { Self(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE { error!(error=%self.0, "request failed"); }
        (status, Json(serde_json::json!({ "detail": self.0.message(), "kind": self.0.kind() }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/predict", post(predict))
        .route("/model-info", get(model_info))
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(state)
}

async fn health(State(st): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", model_loaded: st.model_loaded() })
}

async fn ready(State(st): State<AppState>) -> Result<Json<ReadyResponse>, ApiError> {
    let model = st.model()?;
    Ok(Json(ReadyResponse { status: "ready", model_version: model.version_id() }))
}

async fn predict(State(st): State<AppState>, payload: Result<Json<PredictionRequest>, JsonRejection>) -> Result<Json<PredictionResponse>, ApiError> {
    let result = run_prediction(&st, payload).await;
    metrics::record_outcome(match &result { Ok(_) => "ok", Err(ApiError(e)) => e.kind() });
    if let Err(ApiError(e)) = &result { if e.is_caller_fault() { warn!(error=%e, "prediction rejected"); } }
    result
}

async fn run_prediction(st: &AppState, payload: Result<Json<PredictionRequest>, JsonRejection>) -> Result<Json<PredictionResponse>, ApiError> {
    let model = st.model()?.clone();
    let Json(req) = payload.map_err(|e| Error::InvalidInput(e.body_text()))?;
    let frame = FeatureFrame::new(req.data, req.feature_names)?;
    let n = frame.len();
    let rows = frame.conform(model.predictor.schema())?;
    let predictor = model.predictor.clone();
    let started = Instant::now();
    let predictions = tokio::task::spawn_blocking(move || predictor.predict(&rows))
        .await
        .map_err(|e| Error::Internal(format!("prediction worker: {e}")))??;
    metrics::PREDICT_LATENCY.observe(started.elapsed().as_secs_f64());
    if predictions.len() != n {
        return Err(Error::Internal(format!("model returned {} predictions for {n} rows", predictions.len())).into());
    }
    metrics::PREDICTED_ROWS.inc_by(n as u64);
    Ok(Json(PredictionResponse { predictions, model_version: model.version_id() }))
}

async fn model_info(State(st): State<AppState>) -> Result<Json<ModelInfoResponse>, ApiError> {
    let model = st.model()?;
    let feature_count = model.predictor.schema().feature_count.map(FeatureCount::Known).unwrap_or(FeatureCount::Unknown);
    Ok(Json(ModelInfoResponse { model_version: model.version_id(), model_type: model.predictor.model_type().to_string(), feature_count }))
}
