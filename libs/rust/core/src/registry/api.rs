//! REST surface of the registry service. [`super::HttpRegistry`] is its client.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Registry;
use crate::error::Error;
use crate::model::{ModelVersion, Run, RunId, RunStatus, Stage, VersionSelector};

/// Largest artifact the service accepts in one upload.
pub const MAX_ARTIFACT_BYTES: usize = 512 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRunRequest { pub experiment: String }

#[derive(Debug, Serialize, Deserialize)]
pub struct FinishRunRequest { pub status: RunStatus }

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateVersionRequest { pub run_id: RunId, pub artifact_path: String }

#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub stage: Stage,
    #[serde(default)]
    pub archive_existing: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveQuery { pub selector: String }

type Reg = Arc<dyn Registry>;

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self { Self(e) }
}

pub fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
        Error::Rejected(_) => StatusCode::CONFLICT,
        Error::RegistryUnavailable(_) | Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() { warn!(error=%self.0, "registry request failed"); }
        (status, Json(self.0.to_wire())).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(registry: Reg) -> Router {
    Router::new()
        .route("/api/runs", post(create_run))
        .route("/api/runs/:run_id", get(get_run))
        .route("/api/runs/:run_id/params", post(log_params))
        .route("/api/runs/:run_id/metrics", post(log_metrics))
        .route("/api/runs/:run_id/finish", post(finish_run))
        .route("/api/runs/:run_id/artifacts/*path", get(download_artifact).put(log_artifact))
        .route("/api/models/:name/versions", get(list_versions).post(create_version))
        .route("/api/models/:name/versions/:version", get(get_version))
        .route("/api/models/:name/versions/:version/stage", post(transition))
        .route("/api/models/:name/resolve", get(resolve))
        .layer(DefaultBodyLimit::max(MAX_ARTIFACT_BYTES))
        .with_state(registry)
}

async fn create_run(State(reg): State<Reg>, Json(req): Json<CreateRunRequest>) -> ApiResult<Run> {
    Ok(Json(reg.create_run(&req.experiment).await?))
}

async fn get_run(State(reg): State<Reg>, Path(run_id): Path<String>) -> ApiResult<Run> {
    Ok(Json(reg.get_run(&RunId::new(run_id)).await?))
}

async fn log_params(State(reg): State<Reg>, Path(run_id): Path<String>, Json(params): Json<BTreeMap<String, String>>) -> Result<StatusCode, ApiError> {
    reg.log_params(&RunId::new(run_id), &params).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn log_metrics(State(reg): State<Reg>, Path(run_id): Path<String>, Json(metrics): Json<BTreeMap<String, f64>>) -> Result<StatusCode, ApiError> {
    reg.log_metrics(&RunId::new(run_id), &metrics).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn finish_run(State(reg): State<Reg>, Path(run_id): Path<String>, Json(req): Json<FinishRunRequest>) -> ApiResult<Run> {
    Ok(Json(reg.finish_run(&RunId::new(run_id), req.status).await?))
}

async fn log_artifact(State(reg): State<Reg>, Path((run_id, path)): Path<(String, String)>, body: Bytes) -> Result<StatusCode, ApiError> {
    reg.log_artifact(&RunId::new(run_id), &path, body.to_vec()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn download_artifact(State(reg): State<Reg>, Path((run_id, path)): Path<(String, String)>) -> Result<Vec<u8>, ApiError> {
    Ok(reg.download_artifact(&RunId::new(run_id), &path).await?)
}

async fn list_versions(State(reg): State<Reg>, Path(name): Path<String>) -> ApiResult<Vec<ModelVersion>> {
    Ok(Json(reg.list_versions(&name).await?))
}

async fn create_version(State(reg): State<Reg>, Path(name): Path<String>, Json(req): Json<CreateVersionRequest>) -> ApiResult<ModelVersion> {
    Ok(Json(reg.create_model_version(&name, &req.run_id, &req.artifact_path).await?))
}

async fn get_version(State(reg): State<Reg>, Path((name, version)): Path<(String, u64)>) -> ApiResult<ModelVersion> {
    Ok(Json(reg.get_model_version(&name, version).await?))
}

async fn transition(State(reg): State<Reg>, Path((name, version)): Path<(String, u64)>, Json(req): Json<TransitionRequest>) -> ApiResult<ModelVersion> {
    Ok(Json(reg.transition_stage(&name, version, req.stage, req.archive_existing).await?))
}

async fn resolve(State(reg): State<Reg>, Path(name): Path<String>, Query(q): Query<ResolveQuery>) -> ApiResult<ModelVersion> {
    let selector: VersionSelector = q.selector.parse()?;
    Ok(Json(reg.resolve(&name, selector).await?))
}
