//! Startup configuration for the model server and the registry service.
//!
//! Sources, lowest precedence first: built-in defaults, the file named by
//! `MLOPS_CONFIG_FILE`, `MLOPS__*` environment variables, then the plain
//! `MODEL_REGISTRY_URI` / `MODEL_NAME` / `MODEL_VERSION` variables.

use anyhow::Result;
use serde::Deserialize;

use crate::model::{VersionSelector, DEFAULT_MODEL_NAME};
use crate::registry::DEFAULT_REGISTRY_URI;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub registry_uri: String,
    pub model_name: String,
    /// `latest`, a version number, or a stage name.
    pub model_version: String,
    pub bind_addr: String,
    /// Exit nonzero instead of serving probes when the model fails to load.
    pub exit_on_load_failure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { registry_uri: DEFAULT_REGISTRY_URI.into(), model_name: DEFAULT_MODEL_NAME.into(), model_version: "latest".into(), bind_addr: "0.0.0.0:8000".into(), exit_on_load_failure: false }
    }
}

impl ServerConfig {
    pub fn selector(&self) -> crate::error::Result<VersionSelector> { self.model_version.parse() }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistryServiceConfig {
    pub bind_addr: String,
    pub data_dir: String,
}

fn base_builder() -> config::ConfigBuilder<config::builder::DefaultState> {
    let mut builder = config::Config::builder();
    if let Ok(file) = std::env::var("MLOPS_CONFIG_FILE") {
        builder = builder.add_source(config::File::with_name(&file).required(false));
    }
    builder
}

pub fn load_server_config() -> Result<ServerConfig> {
    let d = ServerConfig::default();
    let cfg = config::Config::builder()
        .set_default("registry_uri", d.registry_uri)?
        .set_default("model_name", d.model_name)?
        .set_default("model_version", d.model_version)?
        .set_default("bind_addr", d.bind_addr)?
        .set_default("exit_on_load_failure", d.exit_on_load_failure)?
        .add_source(base_builder().build()?)
        .add_source(config::Environment::with_prefix("MLOPS").separator("__").try_parsing(true))
        .set_override_option("registry_uri", std::env::var("MODEL_REGISTRY_URI").ok())?
        .set_override_option("model_name", std::env::var("MODEL_NAME").ok())?
        .set_override_option("model_version", std::env::var("MODEL_VERSION").ok())?
        .build()?;
    Ok(cfg.try_deserialize()?)
}

pub fn load_registry_service_config() -> Result<RegistryServiceConfig> {
    let cfg = config::Config::builder()
        .set_default("bind_addr", "0.0.0.0:5000")?
        .set_default("data_dir", "./mlruns")?
        .add_source(base_builder().build()?)
        .add_source(config::Environment::with_prefix("MLOPS").separator("__").try_parsing(true))
        .build()?;
    Ok(cfg.try_deserialize()?)
}
