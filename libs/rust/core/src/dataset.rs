//! Training data sources.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{Error, Result};

/// Fixed-width numeric table plus a target column.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl Dataset {
    pub fn width(&self) -> usize { self.feature_names.len() }
    pub fn len(&self) -> usize { self.features.len() }
    pub fn is_empty(&self) -> bool { self.features.is_empty() }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() { return Err(Error::TrainingFailure("dataset is empty".into())); }
        if self.target.len() != self.features.len() {
            return Err(Error::TrainingFailure(format!("{} target values for {} rows", self.target.len(), self.features.len())));
        }
        if let Some(i) = self.features.iter().position(|r| r.len() != self.width()) {
            return Err(Error::TrainingFailure(format!("row {i} does not have {} features", self.width())));
        }
        if self.features.iter().flatten().chain(self.target.iter()).any(|v| !v.is_finite()) {
            return Err(Error::TrainingFailure("dataset contains non-finite values".into()));
        }
        Ok(())
    }
}

/// Anything that can hand the trainer a dataset.
pub trait DatasetSource: Send + Sync {
    fn describe(&self) -> String;
    fn load(&self) -> Result<Dataset>;
}

/// Gaussian features; the target is the sum of the first `informative` columns plus small noise.
#[derive(Debug, Clone)]
pub struct SyntheticRegression {
    pub samples: usize,
    pub features: usize,
    pub informative: usize,
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticRegression {
    fn default() -> Self { Self { samples: 1000, features: 10, informative: 3, noise: 0.1, seed: 42 } }
}

impl DatasetSource for SyntheticRegression {
    fn describe(&self) -> String { format!("synthetic(samples={}, features={}, seed={})", self.samples, self.features, self.seed) }

    fn load(&self) -> Result<Dataset> {
        if self.samples == 0 || self.features == 0 { return Err(Error::TrainingFailure("synthetic dataset needs at least one sample and one feature".into())); }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let informative = self.informative.min(self.features);
        let features: Vec<Vec<f64>> = (0..self.samples)
            .map(|_| (0..self.features).map(|_| StandardNormal.sample(&mut rng)).collect())
            .collect();
        let target = features.iter().map(|row| {
            let noise: f64 = StandardNormal.sample(&mut rng);
            row[..informative].iter().sum::<f64>() + noise * self.noise
        }).collect();
        let feature_names = (0..self.features).map(|i| format!("feature_{i}")).collect();
        let ds = Dataset { feature_names, features, target };
        ds.validate()?;
        Ok(ds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_is_seeded() {
        let a = SyntheticRegression::default().load().unwrap();
        let b = SyntheticRegression::default().load().unwrap();
        assert_eq!(a.len(), 1000);
        assert_eq!(a.width(), 10);
        assert_eq!(a.features, b.features);
        assert_eq!(a.target, b.target);
        assert_eq!(a.feature_names[9], "feature_9");
    }

    #[test]
    fn validate_catches_mismatch() {
        let ds = Dataset { feature_names: vec!["a".into()], features: vec![vec![1.0]], target: vec![] };
        assert!(matches!(ds.validate(), Err(Error::TrainingFailure(_))));
        assert!(SyntheticRegression { samples: 0, ..Default::default() }.load().is_err());
    }
}
