//! Startup resolution: name + selector -> model version -> artifact bytes -> predictor.

use mlops_core::error::Result;
use mlops_core::{artifact, connect, LoadedModel, Registry, ServerConfig, ServingState, VersionSelector};
use tracing::{error, info};

pub async fn resolve_and_load(registry: &dyn Registry, model_name: &str, selector: VersionSelector) -> Result<LoadedModel> {
    let version = registry.resolve(model_name, selector).await?;
    info!(model=model_name, %selector, version=version.version, run_id=%version.run_id, "model version resolved");
    let bytes = registry.download_artifact(&version.run_id, &version.artifact_path).await?;
    let predictor = artifact::decode(&bytes)?;
    Ok(LoadedModel { version, predictor })
}

/// Runs the one-time `Uninitialized -> Loading -> Ready|Failed` transition.
/// Must complete before the state is shared with request handlers.
pub async fn load(registry: &dyn Registry, model_name: &str, selector: VersionSelector) -> ServingState {
    let mut state = loading();
    let outcome = resolve_and_load(registry, model_name, selector).await;
    settle(&mut state, model_name, &selector.to_string(), outcome);
    state
}

/// Same transition, starting from raw configuration. An unparseable selector or an
/// unusable registry URI fails the load like any other resolution error.
pub async fn load_configured(cfg: &ServerConfig) -> ServingState {
    let target = cfg.selector().and_then(|selector| Ok((connect(&cfg.registry_uri)?, selector)));
    match target {
        Ok((registry, selector)) => load(registry.as_ref(), &cfg.model_name, selector).await,
        Err(e) => {
            let mut state = loading();
            settle(&mut state, &cfg.model_name, &cfg.model_version, Err(e));
            state
        }
    }
}

fn loading() -> ServingState {
    let mut state = ServingState::new();
    if let Err(e) = state.begin_loading() { error!(error=%e, "serving state machine"); }
    state
}

fn settle(state: &mut ServingState, model_name: &str, selector: &str, outcome: Result<LoadedModel>) {
    let transition = match outcome {
        Ok(model) => {
            info!(model=model_name, version=%model.version_id(), model_type=model.predictor.model_type(), "model loaded");
            state.complete(model)
        }
        Err(e) => {
            error!(model=model_name, selector, kind=e.kind(), error=%e, "model failed to load");
            state.fail(e.to_string())
        }
    };
    if let Err(e) = transition { error!(error=%e, "serving state machine"); }
}
