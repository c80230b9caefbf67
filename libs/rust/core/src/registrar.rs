//! Registrar: turn a finished run into a named model version and optionally stage it.

use tracing::{error, info};

use crate::error::{Error, Result};
use crate::model::{ModelVersion, RunId, RunStatus, Stage, MODEL_ARTIFACT_PATH};
use crate::registry::Registry;

pub struct Registrar<'a> {
    registry: &'a dyn Registry,
    archive_existing: bool,
}

impl<'a> Registrar<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self { Self { registry, archive_existing: false } }

    /// Archive other versions holding the target stage when promoting.
    pub fn archive_existing(mut self, yes: bool) -> Self { self.archive_existing = yes; self }

    /// Creates a version of `model_name` bound to the run's model artifact, then moves it to
    /// `stage` if one is given. `Stage::None` is treated as "no promotion".
    ///
    /// A failed transition after a successful creation is returned as
    /// [`Error::StageTransition`] carrying the created version.
    pub async fn register(&self, run_id: &RunId, model_name: &str, stage: Option<Stage>) -> Result<ModelVersion> {
        let run = self.registry.get_run(run_id).await?;
        if run.status != RunStatus::Finished { return Err(Error::NotFound(format!("run '{run_id}' has not completed (status {:?})", run.status))); }
        if !run.has_artifact(MODEL_ARTIFACT_PATH) { return Err(Error::NotFound(format!("run '{run_id}' has no artifact at '{MODEL_ARTIFACT_PATH}'"))); }

        let created = self.registry.create_model_version(model_name, run_id, MODEL_ARTIFACT_PATH).await?;
        info!(model=%created.name, version=created.version, run_id=%run_id, "model registered");

        let stage = match stage { Some(s) if s != Stage::None => s, _ => return Ok(created) };
        match self.registry.transition_stage(&created.name, created.version, stage, self.archive_existing).await {
            Ok(staged) => {
                info!(model=%staged.name, version=staged.version, %stage, "model transitioned");
                Ok(staged)
            }
            Err(e) => {
                error!(model=%created.name, version=created.version, %stage, error=%e, "stage transition failed");
                Err(Error::StageTransition { version: Box::new(created), source: Box::new(e) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    use super::*;
    use crate::model::{Run, VersionSelector};

    /// Registry that knows a single finished run "abc123" and can be told to fail transitions.
    #[derive(Default)]
    struct StubRegistry {
        fail_transition: bool,
        created: Mutex<Vec<ModelVersion>>,
    }

    fn unsupported<T>() -> Result<T> { Err(Error::Internal("not supported by stub".into())) }

    #[async_trait]
    impl Registry for StubRegistry {
        async fn create_run(&self, _: &str) -> Result<Run> { unsupported() }
        async fn get_run(&self, run_id: &RunId) -> Result<Run> {
            if run_id.as_str() != "abc123" { return Err(Error::NotFound(format!("run '{run_id}'"))); }
            let mut run = Run::start("stub");
            run.run_id = run_id.clone();
            run.status = RunStatus::Finished;
            run.artifacts.push(MODEL_ARTIFACT_PATH.into());
            Ok(run)
        }
        async fn log_params(&self, _: &RunId, _: &BTreeMap<String, String>) -> Result<()> { unsupported() }
        async fn log_metrics(&self, _: &RunId, _: &BTreeMap<String, f64>) -> Result<()> { unsupported() }
        async fn log_artifact(&self, _: &RunId, _: &str, _: Vec<u8>) -> Result<()> { unsupported() }
        async fn download_artifact(&self, _: &RunId, _: &str) -> Result<Vec<u8>> { unsupported() }
        async fn finish_run(&self, _: &RunId, _: RunStatus) -> Result<Run> { unsupported() }
        async fn create_model_version(&self, name: &str, run_id: &RunId, artifact_path: &str) -> Result<ModelVersion> {
            let mut created = self.created.lock();
            let mv = ModelVersion { name: name.into(), version: created.len() as u64 + 1, run_id: run_id.clone(), artifact_path: artifact_path.into(), stage: Stage::None, created_at: Utc::now(), last_updated_at: Utc::now() };
            created.push(mv.clone());
            Ok(mv)
        }
        async fn get_model_version(&self, _: &str, _: u64) -> Result<ModelVersion> { unsupported() }
        async fn list_versions(&self, _: &str) -> Result<Vec<ModelVersion>> { Ok(self.created.lock().clone()) }
        async fn transition_stage(&self, name: &str, version: u64, stage: Stage, _: bool) -> Result<ModelVersion> {
            if self.fail_transition { return Err(Error::RegistryUnavailable("connection reset".into())); }
            let mut created = self.created.lock();
            let mv = created.iter_mut().find(|v| v.name == name && v.version == version).ok_or_else(|| Error::NotFound("version".into()))?;
            mv.stage = stage;
            Ok(mv.clone())
        }
        async fn resolve(&self, _: &str, _: VersionSelector) -> Result<ModelVersion> { unsupported() }
    }

    #[tokio::test]
    async fn registers_and_stages() {
        let reg = StubRegistry::default();
        let mv = Registrar::new(&reg).register(&RunId::from("abc123"), "m", Some(Stage::Staging)).await.unwrap();
        assert_eq!(mv.name, "m");
        assert_eq!(mv.version, 1);
        assert_eq!(mv.stage, Stage::Staging);
    }

    #[tokio::test]
    async fn omitted_stage_keeps_default() {
        let reg = StubRegistry::default();
        let r = Registrar::new(&reg);
        assert_eq!(r.register(&RunId::from("abc123"), "m", None).await.unwrap().stage, Stage::None);
        assert_eq!(r.register(&RunId::from("abc123"), "m", Some(Stage::None)).await.unwrap().stage, Stage::None);
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let reg = StubRegistry::default();
        let err = Registrar::new(&reg).register(&RunId::from("nope"), "m", Some(Stage::Staging)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(reg.created.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_transition_reports_created_version() {
        let reg = StubRegistry { fail_transition: true, ..Default::default() };
        let err = Registrar::new(&reg).register(&RunId::from("abc123"), "m", Some(Stage::Production)).await.unwrap_err();
        match err {
            Error::StageTransition { version, source } => {
                assert_eq!(version.version, 1);
                assert!(matches!(*source, Error::RegistryUnavailable(_)));
            }
            other => panic!("expected partial registration, got {other:?}"),
        }
        assert_eq!(reg.created.lock().len(), 1);
    }
}
