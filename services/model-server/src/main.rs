use std::sync::Arc;

use anyhow::{bail, Result};
use mlops_core::{init_tracing, load_server_config, ServingPhase};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("model-server")?;
    let cfg = load_server_config()?;
    info!(?cfg, "config loaded");

    let state = model_server::load_configured(&cfg).await;
    if state.phase() == ServingPhase::Failed {
        if cfg.exit_on_load_failure { bail!("model failed to load: {}", state.failure().unwrap_or("unknown error")); }
        error!("serving probes only; predictions will be refused until restart");
    }

    let state = Arc::new(state);
    let app = model_server::router(state.clone());
    let listener = TcpListener::bind(&cfg.bind_addr).await?;
    info!(addr=%listener.local_addr()?, "model server listening");
    axum::serve(listener, app).with_graceful_shutdown(async { let _ = signal::ctrl_c().await; }).await?;
    info!(uptime_secs=state.uptime().as_secs(), "shutdown");
    Ok(())
}
