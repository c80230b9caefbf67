use anyhow::Result;
use clap::Parser;
use mlops_core::model::DEFAULT_EXPERIMENT;
use mlops_core::{connect, init_tracing, train_and_log, HyperParams, SyntheticRegression, TrainingRequest, DEFAULT_MODEL_NAME, DEFAULT_REGISTRY_URI};
use tracing::info;

/// Fit a random forest regressor and log it to the model registry.
#[derive(Parser, Debug)]
#[command(name = "trainer", version, about, long_about = None)]
struct Cli {
    /// Registry endpoint (http://, file://<dir> or memory://)
    #[arg(long, env = "MODEL_REGISTRY_URI", default_value = DEFAULT_REGISTRY_URI)]
    registry_uri: String,
    /// Number of trees in the forest
    #[arg(long = "n-estimators", default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    tree_count: u64,
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..))]
    max_depth: u16,
    #[arg(long, default_value_t = 1000)]
    samples: usize,
    #[arg(long, default_value_t = 10)]
    features: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value = DEFAULT_EXPERIMENT)]
    experiment: String,
    /// Name the artifact is registered under
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    model_name: String,
    /// Log the run without creating a model version
    #[arg(long)]
    no_register: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing("trainer")?;
    let registry = connect(&cli.registry_uri)?;
    let source = SyntheticRegression { samples: cli.samples, features: cli.features, seed: cli.seed, ..Default::default() };
    let req = TrainingRequest {
        experiment: cli.experiment.clone(),
        params: HyperParams { tree_count: usize::try_from(cli.tree_count)?, max_depth: cli.max_depth },
        register_as: (!cli.no_register).then(|| cli.model_name.clone()),
    };
    let outcome = train_and_log(registry.as_ref(), &source, &req).await?;
    info!(run_id=%outcome.run.run_id, "training complete");
    println!("Model metrics: {}", format_metrics(&outcome.metrics.as_map()));
    println!("Model logged with run ID: {}", outcome.run.run_id);
    if let Some(v) = &outcome.version { println!("Registered model '{}' version {}", v.name, v.version); }
    Ok(())
}

fn format_metrics(m: &std::collections::BTreeMap<String, f64>) -> String {
    m.iter().map(|(k, v)| format!("{k}={v:.6}")).collect::<Vec<_>>().join(", ")
}
