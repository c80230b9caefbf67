use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use mlops_core::{connect, init_tracing, Error, Registrar, RunId, Stage, DEFAULT_MODEL_NAME, DEFAULT_REGISTRY_URI};
use tracing::error;

/// Register a finished run's model artifact under a name and optionally move it to a stage.
#[derive(Parser, Debug)]
#[command(name = "registrar", version, about, long_about = None)]
struct Cli {
    #[arg(long, env = "MODEL_REGISTRY_URI", default_value = DEFAULT_REGISTRY_URI)]
    registry_uri: String,
    /// Run whose `model` artifact is registered
    #[arg(long)]
    run_id: String,
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    model_name: String,
    /// Target stage: Staging, Production, Archived, or None to skip promotion
    #[arg(long, default_value = "Staging")]
    stage: Stage,
    /// Archive versions already holding the target stage
    #[arg(long)]
    archive_existing: bool,
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let registry = connect(&cli.registry_uri)?;
    let stage = (cli.stage != Stage::None).then_some(cli.stage);
    let mv = Registrar::new(registry.as_ref()).archive_existing(cli.archive_existing).register(&RunId::new(cli.run_id.clone()), &cli.model_name, stage).await?;
    println!("Model registered: {} version {}", mv.name, mv.version);
    if let Some(s) = stage { println!("Model transitioned to {s} stage"); }
    println!("Successfully registered model version: {}", mv.version);
    Ok(())
}

/// Process exit status for a failed registration: 2 when the version exists but promotion failed.
fn exit_status(e: &Error) -> u8 {
    match e {
        Error::StageTransition { .. } => 2,
        _ => 1,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing("registrar")?;
    match run(&cli).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            let status = exit_status(&e);
            if status == 2 { error!(kind=e.kind(), error=%e, "registration partially succeeded"); } else { error!(kind=e.kind(), error=%e, "registration failed"); }
            eprintln!("error: {e}");
            Ok(ExitCode::from(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mlops_core::ModelVersion;

    #[test]
    fn partial_registration_exits_2_and_other_failures_exit_1() {
        let created = ModelVersion { name: "m".into(), version: 3, run_id: RunId::from("abc123"), artifact_path: "model".into(), stage: Stage::None, created_at: Utc::now(), last_updated_at: Utc::now() };
        let partial = Error::StageTransition { version: Box::new(created), source: Box::new(Error::RegistryUnavailable("down".into())) };
        assert_eq!(exit_status(&partial), 2);
        for e in [Error::NotFound("run abc123".into()), Error::RegistryUnavailable("down".into()), Error::InvalidInput("bad".into())] {
            assert_eq!(exit_status(&e), 1, "{e}");
        }
    }

    #[test]
    fn stage_none_parses_for_skipping_promotion() {
        let cli = Cli::parse_from(["registrar", "--run-id", "abc123", "--stage", "None"]);
        assert_eq!(cli.stage, Stage::None);
        assert_eq!(cli.model_name, DEFAULT_MODEL_NAME);
    }
}
