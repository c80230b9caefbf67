//! Trainer: fit a random forest on a dataset, evaluate it on a held-out split and publish
//! the run (params, metrics, artifact) to the registry.
//!
//! Nothing is written to the registry until the fit and evaluation have succeeded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::RandomForestRegressorParameters;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::{mean_absolute_error, mean_squared_error, r2};
use smartcore::model_selection::train_test_split;
use tracing::{info, warn};

use crate::artifact::{ArtifactSchema, RandomForestArtifact};
use crate::dataset::{Dataset, DatasetSource};
use crate::error::{Error, Result};
use crate::model::{ModelVersion, Run, RunStatus, MODEL_ARTIFACT_PATH};
use crate::registry::Registry;

pub const SPLIT_SEED: u64 = 42;
pub const TEST_FRACTION: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperParams {
    pub tree_count: usize,
    pub max_depth: u16,
}

impl Default for HyperParams {
    fn default() -> Self { Self { tree_count: 100, max_depth: 10 } }
}

impl HyperParams {
    pub fn validate(&self) -> Result<()> {
        if self.tree_count == 0 { return Err(Error::TrainingFailure("tree_count must be positive".into())); }
        if self.max_depth == 0 { return Err(Error::TrainingFailure("max_depth must be positive".into())); }
        Ok(())
    }

    pub fn as_params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("tree_count".to_string(), self.tree_count.to_string()), ("max_depth".to_string(), self.max_depth.to_string())])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub mean_squared_error: f64,
    pub mean_absolute_error: f64,
    pub r2_score: f64,
}

impl EvaluationMetrics {
    pub fn is_finite(&self) -> bool { [self.mean_squared_error, self.mean_absolute_error, self.r2_score].iter().all(|v| v.is_finite()) }

    pub fn as_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("mean_squared_error".to_string(), self.mean_squared_error),
            ("mean_absolute_error".to_string(), self.mean_absolute_error),
            ("r2_score".to_string(), self.r2_score),
        ])
    }
}

/// Fitted artifact plus its held-out evaluation.
#[derive(Debug)]
pub struct FittedModel {
    pub artifact: RandomForestArtifact,
    pub metrics: EvaluationMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Deterministic 80/20 split, fit, and evaluation.
pub fn fit(dataset: &Dataset, params: &HyperParams) -> Result<FittedModel> {
    params.validate()?;
    dataset.validate()?;
    if dataset.len() < 5 { return Err(Error::TrainingFailure(format!("need at least 5 rows for an 80/20 split, got {}", dataset.len()))); }
    let x = DenseMatrix::from_2d_vec(&dataset.features);
    let (x_train, x_test, y_train, y_test) = train_test_split(&x, &dataset.target, TEST_FRACTION, true, Some(SPLIT_SEED));
    let forest = RandomForestRegressorParameters::default()
        .with_n_trees(params.tree_count)
        .with_max_depth(params.max_depth)
        .with_seed(SPLIT_SEED);
    let artifact = RandomForestArtifact::fit(&x_train, &y_train, forest, ArtifactSchema::named(dataset.feature_names.clone()))?;
    let y_pred = artifact.predict_matrix(&x_test).map_err(|e| Error::TrainingFailure(format!("evaluation: {e}")))?;
    let metrics = EvaluationMetrics {
        mean_squared_error: mean_squared_error(&y_test, &y_pred),
        mean_absolute_error: mean_absolute_error(&y_test, &y_pred),
        r2_score: r2(&y_test, &y_pred),
    };
    if !metrics.is_finite() { return Err(Error::TrainingFailure(format!("evaluation produced non-finite metrics: {metrics:?}"))); }
    Ok(FittedModel { artifact, metrics, train_rows: y_train.len(), test_rows: y_test.len() })
}

#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub experiment: String,
    pub params: HyperParams,
    /// Model name to register the artifact under; `None` only logs the run.
    pub register_as: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub run: Run,
    pub metrics: EvaluationMetrics,
    pub version: Option<ModelVersion>,
}

/// Loads data, fits, then publishes one run and (optionally) one model version.
pub async fn train_and_log(registry: &dyn Registry, source: &dyn DatasetSource, req: &TrainingRequest) -> Result<TrainingOutcome> {
    info!(source=%source.describe(), tree_count=req.params.tree_count, max_depth=req.params.max_depth, "training");
    let dataset = source.load()?;
    let fitted = fit(&dataset, &req.params)?;
    let bytes = fitted.artifact.encode()?;
    info!(train_rows=fitted.train_rows, test_rows=fitted.test_rows, mse=fitted.metrics.mean_squared_error, r2=fitted.metrics.r2_score, "model fitted");

    let run = registry.create_run(&req.experiment).await?;
    let run_id = run.run_id.clone();
    let mut params = req.params.as_params();
    params.insert("dataset".to_string(), source.describe());
    let published = async {
        registry.log_params(&run_id, &params).await?;
        registry.log_metrics(&run_id, &fitted.metrics.as_map()).await?;
        registry.log_artifact(&run_id, MODEL_ARTIFACT_PATH, bytes).await?;
        registry.finish_run(&run_id, RunStatus::Finished).await
    }.await;
    let run = match published {
        Ok(run) => run,
        Err(e) => {
            if let Err(mark) = registry.finish_run(&run_id, RunStatus::Failed).await { warn!(run_id=%run_id, error=%mark, "could not mark run failed"); }
            return Err(e);
        }
    };
    info!(run_id=%run_id, "run logged");

    let version = match &req.register_as {
        Some(name) => Some(registry.create_model_version(name, &run_id, MODEL_ARTIFACT_PATH).await?),
        None => None,
    };
    Ok(TrainingOutcome { run, metrics: fitted.metrics, version })
}
