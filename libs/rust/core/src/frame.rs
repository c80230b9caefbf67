//! Labeled-or-positional feature frame built from a prediction payload.

use std::collections::HashSet;

use crate::artifact::ArtifactSchema;
use crate::error::{Error, Result};

/// Rectangular row-major matrix with optional column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    rows: Vec<Vec<f64>>,
    columns: Option<Vec<String>>,
    width: usize,
}

impl FeatureFrame {
    pub fn new(rows: Vec<Vec<f64>>, columns: Option<Vec<String>>) -> Result<Self> {
        let width = match rows.first() { Some(r) => r.len(), None => return Err(Error::InvalidInput("data must contain at least one row".into())) };
        if width == 0 { return Err(Error::InvalidInput("rows must contain at least one value".into())); }
        if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(Error::InvalidInput(format!("row {i} has {} values, expected {width} (rows must all be the same length)", r.len())));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) { return Err(Error::InvalidInput("data must contain only finite numbers".into())); }
        if let Some(cols) = &columns {
            if cols.len() != width { return Err(Error::InvalidInput(format!("{} feature names given for rows of width {width}", cols.len()))); }
            let mut seen = HashSet::new();
            if let Some(dup) = cols.iter().find(|c| !seen.insert(c.as_str())) { return Err(Error::InvalidInput(format!("duplicate feature name '{dup}'"))); }
        }
        Ok(Self { rows, columns, width })
    }

    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
    pub fn columns(&self) -> Option<&[String]> { self.columns.as_deref() }

    /// Checks the frame against an artifact schema and returns rows in the schema's column order.
    pub fn conform(&self, schema: &ArtifactSchema) -> Result<Vec<Vec<f64>>> {
        if let Some(expected) = schema.feature_count {
            if self.width != expected {
                return Err(Error::InvalidInput(format!("model expects {expected} features per row, got {}", self.width)));
            }
        }
        let (Some(given), Some(declared)) = (&self.columns, &schema.feature_names) else { return Ok(self.rows.clone()) };
        if given == declared { return Ok(self.rows.clone()); }
        let order = declared.iter().map(|name| {
            given.iter().position(|g| g == name).ok_or_else(|| Error::InvalidInput(format!("feature '{name}' missing from feature_names")))
        }).collect::<Result<Vec<_>>>()?;
        if let Some(extra) = given.iter().find(|g| !declared.contains(g)) {
            return Err(Error::InvalidInput(format!("feature '{extra}' was not seen during training")));
        }
        Ok(self.rows.iter().map(|r| order.iter().map(|&i| r[i]).collect()).collect())
    }
}
