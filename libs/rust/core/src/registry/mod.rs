//! Registry of record for runs, model versions and stages.
//!
//! Contract:
//! - version numbers are assigned by the registry, per model name, starting at 1 and strictly increasing;
//! - `latest` resolves to the highest assigned version number for the name;
//! - a version's `(run_id, artifact_path)` binding never changes after creation;
//! - moving a version to the stage it already holds is a no-op;
//! - nothing is ever deleted.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{ModelVersion, Run, RunId, RunStatus, Stage, VersionSelector};

pub mod api;
pub mod http;
pub mod local;

pub use http::HttpRegistry;
pub use local::LocalRegistry;

pub const DEFAULT_REGISTRY_URI: &str = "http://localhost:5000";

#[async_trait]
pub trait Registry: Send + Sync {
    async fn create_run(&self, experiment: &str) -> Result<Run>;
    async fn get_run(&self, run_id: &RunId) -> Result<Run>;
    /// Params are write-once: re-logging a key with a different value is rejected.
    async fn log_params(&self, run_id: &RunId, params: &BTreeMap<String, String>) -> Result<()>;
    async fn log_metrics(&self, run_id: &RunId, metrics: &BTreeMap<String, f64>) -> Result<()>;
    async fn log_artifact(&self, run_id: &RunId, path: &str, bytes: Vec<u8>) -> Result<()>;
    async fn download_artifact(&self, run_id: &RunId, path: &str) -> Result<Vec<u8>>;
    async fn finish_run(&self, run_id: &RunId, status: RunStatus) -> Result<Run>;

    /// Fails with `NotFound` unless the run finished and holds an artifact at `artifact_path`.
    async fn create_model_version(&self, name: &str, run_id: &RunId, artifact_path: &str) -> Result<ModelVersion>;
    async fn get_model_version(&self, name: &str, version: u64) -> Result<ModelVersion>;
    /// Ascending by version number.
    async fn list_versions(&self, name: &str) -> Result<Vec<ModelVersion>>;
    async fn transition_stage(&self, name: &str, version: u64, stage: Stage, archive_existing: bool) -> Result<ModelVersion>;
    async fn resolve(&self, name: &str, selector: VersionSelector) -> Result<ModelVersion>;
}

/// Opens a registry from a URI: `http(s)://` talks to a registry service, `file://<dir>`
/// or a bare path opens a local store, `memory://` opens an ephemeral one.
pub fn connect(uri: &str) -> Result<Arc<dyn Registry>> {
    let uri = uri.trim();
    if uri.starts_with("http://") || uri.starts_with("https://") { return Ok(Arc::new(HttpRegistry::new(uri)?)); }
    if uri == "memory://" || uri == "memory:" { return Ok(Arc::new(LocalRegistry::temporary()?)); }
    let path = uri.strip_prefix("file://").unwrap_or(uri);
    if path.is_empty() || path.contains("://") { return Err(Error::InvalidInput(format!("unsupported registry uri '{uri}'"))); }
    Ok(Arc::new(LocalRegistry::open(path)?))
}

/// Picks the version a selector names out of a name's versions.
pub(crate) fn select(name: &str, versions: &[ModelVersion], selector: VersionSelector) -> Result<ModelVersion> {
    let found = match selector {
        VersionSelector::Latest => versions.iter().max_by_key(|v| v.version),
        VersionSelector::Version(n) => versions.iter().find(|v| v.version == n),
        VersionSelector::Stage(s) => versions.iter().filter(|v| v.stage == s).max_by_key(|v| v.version),
    };
    found.cloned().ok_or_else(|| Error::NotFound(format!("no version of model '{name}' matches selector '{selector}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_schemes() {
        assert!(connect("memory://").is_ok());
        assert!(connect("http://localhost:5000").is_ok());
        assert!(connect("ftp://nowhere").is_err());
    }
}
