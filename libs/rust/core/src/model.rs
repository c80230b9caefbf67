//! Registry data model: runs, model versions, stages and version selectors.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Name every trainer run registers its artifact under unless told otherwise.
pub const DEFAULT_MODEL_NAME: &str = "random_forest_regressor";
/// Well-known path of the model artifact inside a run.
pub const MODEL_ARTIFACT_PATH: &str = "model";
pub const DEFAULT_EXPERIMENT: &str = "Default";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn generate() -> Self { Self(uuid::Uuid::new_v4().simple().to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus { Running, Finished, Failed }

/// One training execution. Params and artifacts are frozen once the run leaves `Running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub experiment: String,
    pub status: RunStatus,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Run {
    pub fn start(experiment: &str) -> Self {
        Self { run_id: RunId::generate(), experiment: experiment.to_string(), status: RunStatus::Running, params: BTreeMap::new(), metrics: BTreeMap::new(), artifacts: Vec::new(), start_time: Utc::now(), end_time: None }
    }
    pub fn is_running(&self) -> bool { self.status == RunStatus::Running }
    pub fn has_artifact(&self, path: &str) -> bool { self.artifacts.iter().any(|a| a == path) }
}

/// Lifecycle label attached to a model version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    None,
    Staging,
    Production,
    Archived,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self { Stage::None => "None", Stage::Staging => "Staging", Stage::Production => "Production", Stage::Archived => "Archived" }
    }
    /// Stages whose previous holders get archived when `archive_existing` is requested.
    pub fn is_active(&self) -> bool { matches!(self, Stage::Staging | Stage::Production) }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Stage {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Stage::None),
            "staging" => Ok(Stage::Staging),
            "production" => Ok(Stage::Production),
            "archived" => Ok(Stage::Archived),
            other => Err(Error::InvalidInput(format!("unknown stage '{other}' (expected None, Staging, Production or Archived)"))),
        }
    }
}

/// Registry-assigned binding of `name` + `version` to one run's artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub name: String,
    pub version: u64,
    pub run_id: RunId,
    pub artifact_path: String,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl ModelVersion {
    pub fn version_id(&self) -> String { self.version.to_string() }
}

/// How a server names the version it wants: `latest`, an explicit number, or a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSelector {
    /// Highest version number registered under the name.
    Latest,
    Version(u64),
    /// Highest version number currently holding the stage.
    Stage(Stage),
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { VersionSelector::Latest => f.write_str("latest"), VersionSelector::Version(v) => write!(f, "{v}"), VersionSelector::Stage(s) => write!(f, "{s}") }
    }
}

impl FromStr for VersionSelector {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") { return Ok(VersionSelector::Latest); }
        if let Ok(v) = s.parse::<u64>() {
            if v == 0 { return Err(Error::InvalidInput("model versions start at 1".into())); }
            return Ok(VersionSelector::Version(v));
        }
        match s.parse::<Stage>() {
            Ok(Stage::None) | Err(_) => Err(Error::InvalidInput(format!("invalid version selector '{s}' (expected 'latest', a version number or a stage)"))),
            Ok(stage) => Ok(VersionSelector::Stage(stage)),
        }
    }
}
