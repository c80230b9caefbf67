//! Registry client speaking the registry service's REST API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::api::{CreateRunRequest, CreateVersionRequest, FinishRunRequest, TransitionRequest};
use super::Registry;
use crate::error::{Error, Result, WireError};
use crate::model::{ModelVersion, Run, RunId, RunStatus, Stage, VersionSelector};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base: Url,
    client: Client,
}

fn transport_err(e: reqwest::Error) -> Error { Error::RegistryUnavailable(e.to_string()) }

impl HttpRegistry {
    pub fn new(endpoint: &str) -> Result<Self> {
        let base = Url::parse(endpoint).map_err(|e| Error::InvalidInput(format!("registry uri '{endpoint}': {e}")))?;
        if base.cannot_be_a_base() { return Err(Error::InvalidInput(format!("registry uri '{endpoint}' cannot be a base url"))); }
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build().map_err(transport_err)?;
        Ok(Self { base, client })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidInput(format!("registry uri '{}' cannot be a base url", self.base)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let url = self.url(segments)?;
        debug!(%method, %url, "registry request");
        Ok(self.client.request(method, url))
    }

    async fn send(req: RequestBuilder) -> Result<reqwest::Response> {
        let resp = req.send().await.map_err(transport_err)?;
        let status = resp.status();
        if status.is_success() { return Ok(resp); }
        let body = resp.bytes().await.map_err(transport_err)?;
        Err(match serde_json::from_slice::<WireError>(&body) {
            Ok(w) => Error::from_wire(w),
            Err(_) => match status {
                StatusCode::NOT_FOUND => Error::NotFound(String::from_utf8_lossy(&body).into_owned()),
                StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => Error::RegistryUnavailable(format!("registry returned {status}")),
                _ => Error::Internal(format!("registry returned {status}: {}", String::from_utf8_lossy(&body))),
            },
        })
    }

    async fn json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T> {
        Self::send(req).await?.json::<T>().await.map_err(|e| Error::Internal(format!("decode registry response: {e}")))
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, segments: &[&str], body: &B) -> Result<T> {
        Self::json(self.request(Method::POST, segments)?.json(body)).await
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn create_run(&self, experiment: &str) -> Result<Run> {
        self.post_json(&["runs"], &CreateRunRequest { experiment: experiment.to_string() }).await
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Run> {
        Self::json(self.request(Method::GET, &["runs", run_id.as_str()])?).await
    }

    async fn log_params(&self, run_id: &RunId, params: &BTreeMap<String, String>) -> Result<()> {
        Self::send(self.request(Method::POST, &["runs", run_id.as_str(), "params"])?.json(params)).await.map(drop)
    }

    async fn log_metrics(&self, run_id: &RunId, metrics: &BTreeMap<String, f64>) -> Result<()> {
        Self::send(self.request(Method::POST, &["runs", run_id.as_str(), "metrics"])?.json(metrics)).await.map(drop)
    }

    async fn log_artifact(&self, run_id: &RunId, path: &str, bytes: Vec<u8>) -> Result<()> {
        let mut segments = vec!["runs", run_id.as_str(), "artifacts"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        Self::send(self.request(Method::PUT, &segments)?.body(bytes)).await.map(drop)
    }

    async fn download_artifact(&self, run_id: &RunId, path: &str) -> Result<Vec<u8>> {
        let mut segments = vec!["runs", run_id.as_str(), "artifacts"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let resp = Self::send(self.request(Method::GET, &segments)?).await?;
        Ok(resp.bytes().await.map_err(transport_err)?.to_vec())
    }

    async fn finish_run(&self, run_id: &RunId, status: RunStatus) -> Result<Run> {
        self.post_json(&["runs", run_id.as_str(), "finish"], &FinishRunRequest { status }).await
    }

    async fn create_model_version(&self, name: &str, run_id: &RunId, artifact_path: &str) -> Result<ModelVersion> {
        let req = CreateVersionRequest { run_id: run_id.clone(), artifact_path: artifact_path.to_string() };
        self.post_json(&["models", name, "versions"], &req).await
    }

    async fn get_model_version(&self, name: &str, version: u64) -> Result<ModelVersion> {
        Self::json(self.request(Method::GET, &["models", name, "versions", &version.to_string()])?).await
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        Self::json(self.request(Method::GET, &["models", name, "versions"])?).await
    }

    async fn transition_stage(&self, name: &str, version: u64, stage: Stage, archive_existing: bool) -> Result<ModelVersion> {
        self.post_json(&["models", name, "versions", &version.to_string(), "stage"], &TransitionRequest { stage, archive_existing }).await
    }

    async fn resolve(&self, name: &str, selector: VersionSelector) -> Result<ModelVersion> {
        Self::json(self.request(Method::GET, &["models", name, "resolve"])?.query(&[("selector", selector.to_string())])).await
    }
}
