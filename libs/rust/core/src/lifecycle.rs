//! Serving lifecycle finite state machine.
//!
//! Phases:
//! - Uninitialized
//! - Loading
//! - Ready (terminal, model present)
//! - Failed (terminal, prediction traffic refused)
//!
//! The loaded model is set exactly once on `Loading -> Ready` and only read afterwards.
//! Tracks time spent in each phase.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::artifact::Predictor;
use crate::error::{Error, Result};
use crate::model::ModelVersion;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServingPhase { Uninitialized, Loading, Ready, Failed }

/// Resolved version plus the artifact deserialized from it.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub version: ModelVersion,
    pub predictor: Arc<dyn Predictor>,
}

impl LoadedModel {
    pub fn version_id(&self) -> String { self.version.version_id() }
}

#[derive(Debug)]
pub struct ServingState {
    phase: ServingPhase,
    model: Option<LoadedModel>,
    failure: Option<String>,
    started_at: Instant,
    phase_started_at: Instant,
    phase_durations: Vec<(ServingPhase, Duration)>,
}

impl Default for ServingState {
    fn default() -> Self { Self::new() }
}

impl ServingState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self { phase: ServingPhase::Uninitialized, model: None, failure: None, started_at: now, phase_started_at: now, phase_durations: Vec::new() }
    }

    pub fn phase(&self) -> ServingPhase { self.phase }
    pub fn is_ready(&self) -> bool { self.phase == ServingPhase::Ready }
    /// Liveness view: whether a model object is present.
    pub fn model_loaded(&self) -> bool { self.model.is_some() }
    pub fn failure(&self) -> Option<&str> { self.failure.as_deref() }
    pub fn durations(&self) -> &[(ServingPhase, Duration)] { &self.phase_durations }
    pub fn uptime(&self) -> Duration { self.started_at.elapsed() }

    fn advance(&mut self, expected: ServingPhase, next: ServingPhase) -> Result<()> {
        if self.phase != expected {
            return Err(Error::Internal(format!("illegal serving transition {:?} -> {next:?}", self.phase)));
        }
        let now = Instant::now();
        self.phase_durations.push((self.phase, now - self.phase_started_at));
        self.phase = next;
        self.phase_started_at = now;
        Ok(())
    }

    pub fn begin_loading(&mut self) -> Result<()> { self.advance(ServingPhase::Uninitialized, ServingPhase::Loading) }

    pub fn complete(&mut self, model: LoadedModel) -> Result<()> {
        self.advance(ServingPhase::Loading, ServingPhase::Ready)?;
        self.model = Some(model);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.advance(ServingPhase::Loading, ServingPhase::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }

    /// Readiness-gated access to the loaded model.
    pub fn model(&self) -> Result<&LoadedModel> {
        match (&self.phase, &self.model) {
            (ServingPhase::Ready, Some(m)) => Ok(m),
            (ServingPhase::Failed, _) => Err(Error::ServiceUnavailable(format!("model failed to load: {}", self.failure.as_deref().unwrap_or("unknown error")))),
            (ServingPhase::Loading, _) => Err(Error::ServiceUnavailable("model is loading".into())),
            _ => Err(Error::ServiceUnavailable("model not loaded".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactSchema;
    use crate::model::{RunId, Stage};
    use chrono::Utc;

    #[derive(Debug)]
    struct Constant(ArtifactSchema);
    impl Predictor for Constant {
        fn model_type(&self) -> &str { "Constant" }
        fn schema(&self) -> &ArtifactSchema { &self.0 }
        fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> { Ok(vec![0.0; rows.len()]) }
    }

    fn loaded() -> LoadedModel {
        let version = ModelVersion { name: "m".into(), version: 3, run_id: RunId::from("r"), artifact_path: "model".into(), stage: Stage::None, created_at: Utc::now(), last_updated_at: Utc::now() };
        LoadedModel { version, predictor: Arc::new(Constant(ArtifactSchema { feature_count: None, feature_names: None })) }
    }

    #[test]
    fn fsm_reaches_ready() {
        let mut st = ServingState::new();
        assert!(matches!(st.model(), Err(Error::ServiceUnavailable(_))));
        st.begin_loading().unwrap();
        assert!(matches!(st.model(), Err(Error::ServiceUnavailable(_))));
        st.complete(loaded()).unwrap();
        assert!(st.is_ready() && st.model_loaded());
        assert_eq!(st.model().unwrap().version_id(), "3");
        assert_eq!(st.durations().len(), 2);
    }

    #[test]
    fn failed_is_terminal() {
        let mut st = ServingState::new();
        st.begin_loading().unwrap();
        st.fail("registry down").unwrap();
        assert_eq!(st.phase(), ServingPhase::Failed);
        assert!(st.model().unwrap_err().to_string().contains("registry down"));
        assert!(st.complete(loaded()).is_err());
        assert!(!st.model_loaded());
    }

    #[test]
    fn transitions_are_ordered() {
        let mut st = ServingState::new();
        assert!(st.complete(loaded()).is_err());
        assert!(st.fail("x").is_err());
        st.begin_loading().unwrap();
        assert!(st.begin_loading().is_err());
    }
}
