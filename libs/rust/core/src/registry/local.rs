//! sled-backed registry. Used directly for `file://` and `memory://` URIs and as the
//! store behind the registry service.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use tracing::{debug, info};

use super::{select, Registry};
use crate::error::{Error, Result};
use crate::model::{ModelVersion, Run, RunId, RunStatus, Stage, VersionSelector};

pub struct LocalRegistry {
    db: Db,
    runs: Tree,
    artifacts: Tree,
    versions: Tree,
    // serializes read-modify-write sequences (version assignment, stage moves)
    write: Mutex<()>,
}

fn store_err(e: sled::Error) -> Error { Error::RegistryUnavailable(format!("local store: {e}")) }

fn version_key(name: &str, version: u64) -> Vec<u8> {
    let mut k = version_prefix(name);
    k.extend_from_slice(&version.to_be_bytes());
    k
}

fn version_prefix(name: &str) -> Vec<u8> {
    let mut k = name.as_bytes().to_vec();
    k.push(0);
    k
}

fn artifact_key(run_id: &RunId, path: &str) -> Vec<u8> { format!("{run_id}/{path}").into_bytes() }

fn normalize_path(path: &str) -> Result<&str> {
    let p = path.trim_matches('/');
    if p.is_empty() || p.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(Error::InvalidInput(format!("invalid artifact path '{path}'")));
    }
    Ok(p)
}

impl LocalRegistry {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(store_err)?;
        info!(path=%path.as_ref().display(), "local registry opened");
        Self::with_db(db)
    }

    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open().map_err(store_err)?;
        Self::with_db(db)
    }

    fn with_db(db: Db) -> Result<Self> {
        let runs = db.open_tree("runs").map_err(store_err)?;
        let artifacts = db.open_tree("artifacts").map_err(store_err)?;
        let versions = db.open_tree("versions").map_err(store_err)?;
        Ok(Self { db, runs, artifacts, versions, write: Mutex::new(()) })
    }

    fn get<T: DeserializeOwned>(tree: &Tree, key: &[u8]) -> Result<Option<T>> {
        match tree.get(key).map_err(store_err)? { Some(v) => Ok(Some(serde_json::from_slice(&v)?)), None => Ok(None) }
    }

    fn put<T: Serialize>(&self, tree: &Tree, key: &[u8], value: &T) -> Result<()> {
        tree.insert(key, serde_json::to_vec(value)?).map_err(store_err)?;
        self.db.flush().map_err(store_err)?;
        Ok(())
    }

    fn load_run(&self, run_id: &RunId) -> Result<Run> {
        Self::get(&self.runs, run_id.as_str().as_bytes())?.ok_or_else(|| Error::NotFound(format!("run '{run_id}'")))
    }

    fn running_run(&self, run_id: &RunId) -> Result<Run> {
        let run = self.load_run(run_id)?;
        if !run.is_running() { return Err(Error::Rejected(format!("run '{run_id}' is {:?} and can no longer be modified", run.status))); }
        Ok(run)
    }

    fn versions_of(&self, name: &str) -> Result<Vec<ModelVersion>> {
        self.versions.scan_prefix(version_prefix(name))
            .map(|kv| -> Result<ModelVersion> { let (_, v) = kv.map_err(store_err)?; Ok(serde_json::from_slice(&v)?) })
            .collect()
    }
}

#[async_trait]
impl Registry for LocalRegistry {
    async fn create_run(&self, experiment: &str) -> Result<Run> {
        let run = Run::start(experiment);
        self.put(&self.runs, run.run_id.as_str().as_bytes(), &run)?;
        debug!(run_id=%run.run_id, experiment, "run created");
        Ok(run)
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Run> { self.load_run(run_id) }

    async fn log_params(&self, run_id: &RunId, params: &BTreeMap<String, String>) -> Result<()> {
        let _g = self.write.lock();
        let mut run = self.running_run(run_id)?;
        for (k, v) in params {
            match run.params.get(k) {
                Some(old) if old != v => return Err(Error::Rejected(format!("param '{k}' already logged as '{old}'"))),
                _ => { run.params.insert(k.clone(), v.clone()); }
            }
        }
        self.put(&self.runs, run_id.as_str().as_bytes(), &run)
    }

    async fn log_metrics(&self, run_id: &RunId, metrics: &BTreeMap<String, f64>) -> Result<()> {
        let _g = self.write.lock();
        let mut run = self.running_run(run_id)?;
        run.metrics.extend(metrics.iter().map(|(k, v)| (k.clone(), *v)));
        self.put(&self.runs, run_id.as_str().as_bytes(), &run)
    }

    async fn log_artifact(&self, run_id: &RunId, path: &str, bytes: Vec<u8>) -> Result<()> {
        let path = normalize_path(path)?;
        let _g = self.write.lock();
        let mut run = self.running_run(run_id)?;
        self.artifacts.insert(artifact_key(run_id, path), bytes).map_err(store_err)?;
        if !run.has_artifact(path) { run.artifacts.push(path.to_string()); }
        self.put(&self.runs, run_id.as_str().as_bytes(), &run)
    }

    async fn download_artifact(&self, run_id: &RunId, path: &str) -> Result<Vec<u8>> {
        let path = normalize_path(path)?;
        match self.artifacts.get(artifact_key(run_id, path)).map_err(store_err)? {
            Some(v) => Ok(v.to_vec()),
            None => Err(Error::NotFound(format!("artifact '{path}' in run '{run_id}'"))),
        }
    }

    async fn finish_run(&self, run_id: &RunId, status: RunStatus) -> Result<Run> {
        if status == RunStatus::Running { return Err(Error::InvalidInput("a run cannot be finished as Running".into())); }
        let _g = self.write.lock();
        let mut run = self.running_run(run_id)?;
        run.status = status;
        run.end_time = Some(Utc::now());
        self.put(&self.runs, run_id.as_str().as_bytes(), &run)?;
        debug!(run_id=%run_id, ?status, "run finished");
        Ok(run)
    }

    async fn create_model_version(&self, name: &str, run_id: &RunId, artifact_path: &str) -> Result<ModelVersion> {
        if name.trim().is_empty() { return Err(Error::InvalidInput("model name must not be empty".into())); }
        if name.contains('\0') { return Err(Error::InvalidInput("model name must not contain NUL".into())); }
        let path = normalize_path(artifact_path)?;
        let _g = self.write.lock();
        let run = self.load_run(run_id)?;
        if run.status != RunStatus::Finished { return Err(Error::NotFound(format!("run '{run_id}' has not completed (status {:?})", run.status))); }
        if !run.has_artifact(path) { return Err(Error::NotFound(format!("run '{run_id}' has no artifact at '{path}'"))); }
        let next = self.versions_of(name)?.iter().map(|v| v.version).max().unwrap_or(0) + 1;
        let now = Utc::now();
        let mv = ModelVersion { name: name.to_string(), version: next, run_id: run_id.clone(), artifact_path: path.to_string(), stage: Stage::None, created_at: now, last_updated_at: now };
        self.put(&self.versions, &version_key(name, next), &mv)?;
        info!(model=name, version=next, run_id=%run_id, "model version created");
        Ok(mv)
    }

    async fn get_model_version(&self, name: &str, version: u64) -> Result<ModelVersion> {
        Self::get(&self.versions, &version_key(name, version))?.ok_or_else(|| Error::NotFound(format!("model '{name}' version {version}")))
    }

    async fn list_versions(&self, name: &str) -> Result<Vec<ModelVersion>> { self.versions_of(name) }

    async fn transition_stage(&self, name: &str, version: u64, stage: Stage, archive_existing: bool) -> Result<ModelVersion> {
        let _g = self.write.lock();
        let mut mv: ModelVersion = Self::get(&self.versions, &version_key(name, version))?.ok_or_else(|| Error::NotFound(format!("model '{name}' version {version}")))?;
        if archive_existing && stage.is_active() {
            for mut other in self.versions_of(name)?.into_iter().filter(|v| v.version != version && v.stage == stage) {
                other.stage = Stage::Archived;
                other.last_updated_at = Utc::now();
                self.put(&self.versions, &version_key(name, other.version), &other)?;
                info!(model=name, version=other.version, "archived previous {stage} version");
            }
        }
        if mv.stage == stage { return Ok(mv); }
        mv.stage = stage;
        mv.last_updated_at = Utc::now();
        self.put(&self.versions, &version_key(name, version), &mv)?;
        info!(model=name, version, %stage, "stage transitioned");
        Ok(mv)
    }

    async fn resolve(&self, name: &str, selector: VersionSelector) -> Result<ModelVersion> {
        if let VersionSelector::Version(n) = selector { return self.get_model_version(name, n).await; }
        select(name, &self.versions_of(name)?, selector)
    }
}
