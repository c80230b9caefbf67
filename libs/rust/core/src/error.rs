//! Error taxonomy shared by the trainer, registrar, registry and model server.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ModelVersion;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")] NotFound(String),
    #[error("registry unavailable: {0}")] RegistryUnavailable(String),
    #[error("service unavailable: {0}")] ServiceUnavailable(String),
    #[error("invalid input: {0}")] InvalidInput(String),
    #[error("training failed: {0}")] TrainingFailure(String),
    #[error("registry rejected request: {0}")] Rejected(String),
    #[error("artifact error: {0}")] Artifact(String),
    #[error("version {} of '{}' was created but the stage transition failed: {source}", .version.version, .version.name)]
    StageTransition { version: Box<ModelVersion>, source: Box<Error> },
    #[error("internal error: {0}")] Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Body returned by the registry API for any non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub kind: String,
    pub message: String,
}

impl Error {
    /// Stable identifier used on the wire and in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::RegistryUnavailable(_) => "registry_unavailable",
            Error::ServiceUnavailable(_) => "service_unavailable",
            Error::InvalidInput(_) => "invalid_input",
            Error::TrainingFailure(_) => "training_failure",
            Error::Rejected(_) => "rejected",
            Error::Artifact(_) => "artifact",
            Error::StageTransition { .. } => "stage_transition",
            Error::Internal(_) => "internal",
        }
    }

    /// Caller faults are recoverable per request; everything else is a server or dependency fault.
    pub fn is_caller_fault(&self) -> bool { matches!(self, Error::InvalidInput(_) | Error::NotFound(_) | Error::Rejected(_)) }

    pub fn message(&self) -> String {
        match self {
            Error::NotFound(m) | Error::RegistryUnavailable(m) | Error::ServiceUnavailable(m) | Error::InvalidInput(m)
            | Error::TrainingFailure(m) | Error::Rejected(m) | Error::Artifact(m) | Error::Internal(m) => m.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_wire(&self) -> WireError { WireError { kind: self.kind().to_string(), message: self.message() } }

    /// Inverse of [`Error::to_wire`]; unknown kinds degrade to `Internal`.
    pub fn from_wire(w: WireError) -> Self {
        match w.kind.as_str() {
            "not_found" => Error::NotFound(w.message),
            "registry_unavailable" => Error::RegistryUnavailable(w.message),
            "service_unavailable" => Error::ServiceUnavailable(w.message),
            "invalid_input" => Error::InvalidInput(w.message),
            "training_failure" => Error::TrainingFailure(w.message),
            "rejected" => Error::Rejected(w.message),
            "artifact" => Error::Artifact(w.message),
            _ => Error::Internal(w.message),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self { Error::Internal(format!("serialization: {e}")) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip_keeps_variant() {
        let e = Error::NotFound("run abc".into());
        match Error::from_wire(e.to_wire()) { Error::NotFound(m) => assert_eq!(m, "run abc"), other => panic!("unexpected {other:?}") }
        assert!(matches!(Error::from_wire(WireError { kind: "bogus".into(), message: "x".into() }), Error::Internal(_)));
    }

    #[test]
    fn caller_faults_are_classified() {
        assert!(Error::InvalidInput("w".into()).is_caller_fault());
        assert!(!Error::ServiceUnavailable("loading".into()).is_caller_fault());
        assert!(!Error::Internal("boom".into()).is_caller_fault());
    }
}
