//! Core shared code for the training, registration and serving services.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::prelude::*;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

pub mod artifact;
pub mod dataset;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod model;
pub mod registrar;
pub mod registry;
pub mod settings;
pub mod training;

pub use artifact::{ArtifactSchema, Predictor, RandomForestArtifact};
pub use settings::{load_registry_service_config, load_server_config, RegistryServiceConfig, ServerConfig};
pub use dataset::{Dataset, DatasetSource, SyntheticRegression};
pub use error::{Error, Result as CoreResult};
pub use frame::FeatureFrame;
pub use lifecycle::{LoadedModel, ServingPhase, ServingState};
pub use model::{ModelVersion, Run, RunId, RunStatus, Stage, VersionSelector, DEFAULT_MODEL_NAME, MODEL_ARTIFACT_PATH};
pub use registrar::Registrar;
pub use registry::{connect, HttpRegistry, LocalRegistry, Registry, DEFAULT_REGISTRY_URI};
pub use training::{train_and_log, EvaluationMetrics, HyperParams, TrainingOutcome, TrainingRequest};

/// Installs the fmt subscriber once per process. `RUST_LOG` filters (default `info`);
/// `MLOPS_JSON_LOG=1|true` switches to JSON lines.
pub fn init_tracing(service: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("MLOPS_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let (json_layer, text_layer) = if json {
            (Some(tracing_subscriber::fmt::layer().json().flatten_event(true).with_current_span(true).with_span_list(false)), None)
        } else {
            (None, Some(tracing_subscriber::fmt::layer().with_target(true).with_thread_ids(false).with_line_number(true)))
        };
        tracing_subscriber::registry().with(env_filter).with(json_layer).with(text_layer).try_init()?;
        Ok(())
    })?;
    info!(target: "mlops", service, "tracing initialized");
    Ok(())
}
