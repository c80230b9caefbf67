use std::sync::Arc;

use anyhow::Result;
use mlops_core::registry::api;
use mlops_core::{init_tracing, load_registry_service_config, LocalRegistry, Registry};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("registry-service")?;
    let cfg = load_registry_service_config()?;
    info!(?cfg, "config loaded");

    let store: Arc<dyn Registry> = Arc::new(LocalRegistry::open(&cfg.data_dir)?);
    let listener = TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr=%listener.local_addr()?, data_dir=%cfg.data_dir, "registry listening");
    axum::serve(listener, api::router(store)).with_graceful_shutdown(async { let _ = signal::ctrl_c().await; }).await?;
    info!("shutdown");
    Ok(())
}
