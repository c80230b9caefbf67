//! Model artifacts: schema, the serialized envelope stored in the registry, and the
//! in-memory predictor a server loads from it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{RandomForestRegressor, RandomForestRegressorParameters};
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::error::{Error, Result};

pub const ENVELOPE_FORMAT_VERSION: u32 = 1;
pub const RANDOM_FOREST_FLAVOR: &str = "smartcore.random_forest_regressor";

/// Declared input layout of an artifact. Every artifact yields exactly one value per input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSchema {
    /// `None` when the artifact does not declare its width.
    pub feature_count: Option<usize>,
    pub feature_names: Option<Vec<String>>,
}

impl ArtifactSchema {
    pub fn named(feature_names: Vec<String>) -> Self {
        Self { feature_count: Some(feature_names.len()), feature_names: Some(feature_names) }
    }
}

/// A loaded model. Implementations are read-only after construction.
pub trait Predictor: Send + Sync + fmt::Debug {
    fn model_type(&self) -> &str;
    fn schema(&self) -> &ArtifactSchema;
    /// `rows` has already been conformed to [`Predictor::schema`].
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    flavor: String,
    format_version: u32,
    model_type: String,
    schema: ArtifactSchema,
    created_at: DateTime<Utc>,
    payload: serde_json::Value,
}

/// Deserializes an artifact fetched from the registry into a predictor.
pub fn decode(bytes: &[u8]) -> Result<Arc<dyn Predictor>> {
    let env: Envelope = serde_json::from_slice(bytes).map_err(|e| Error::Artifact(format!("malformed artifact envelope: {e}")))?;
    if env.format_version != ENVELOPE_FORMAT_VERSION {
        return Err(Error::Artifact(format!("unsupported artifact format version {}", env.format_version)));
    }
    match env.flavor.as_str() {
        RANDOM_FOREST_FLAVOR => {
            let model = serde_json::from_value(env.payload).map_err(|e| Error::Artifact(format!("random forest payload: {e}")))?;
            Ok(Arc::new(RandomForestArtifact { schema: env.schema, model }))
        }
        other => Err(Error::Artifact(format!("unknown artifact flavor '{other}'"))),
    }
}

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Random forest regressor fitted by the trainer.
pub struct RandomForestArtifact {
    schema: ArtifactSchema,
    model: Forest,
}

impl fmt::Debug for RandomForestArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.debug_struct("RandomForestArtifact").field("schema", &self.schema).finish_non_exhaustive() }
}

impl RandomForestArtifact {
    pub fn fit(x: &DenseMatrix<f64>, y: &Vec<f64>, params: RandomForestRegressorParameters, schema: ArtifactSchema) -> Result<Self> {
        let model = Forest::fit(x, y, params).map_err(|e| Error::TrainingFailure(format!("random forest fit: {e}")))?;
        Ok(Self { schema, model })
    }

    pub fn predict_matrix(&self, x: &DenseMatrix<f64>) -> Result<Vec<f64>> {
        self.model.predict(x).map_err(|e| Error::Internal(format!("random forest predict: {e}")))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let env = Envelope {
            flavor: RANDOM_FOREST_FLAVOR.to_string(),
            format_version: ENVELOPE_FORMAT_VERSION,
            model_type: self.model_type().to_string(),
            schema: self.schema.clone(),
            created_at: Utc::now(),
            payload: serde_json::to_value(&self.model).map_err(|e| Error::Artifact(format!("serialize model: {e}")))?,
        };
        serde_json::to_vec(&env).map_err(|e| Error::Artifact(format!("serialize envelope: {e}")))
    }
}

impl Predictor for RandomForestArtifact {
    fn model_type(&self) -> &str { "RandomForestRegressor" }
    fn schema(&self) -> &ArtifactSchema { &self.schema }
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if rows.is_empty() { return Ok(Vec::new()); }
        self.predict_matrix(&DenseMatrix::from_2d_vec(&rows.to_vec()))
    }
}
