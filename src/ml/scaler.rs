//! Per-feature standardization fitted on the training frame.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::schema::FeatureVector;
use crate::error::{HooplineError, Result};

/// Mean/scale standardization keyed by feature order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub feature_order: Vec<String>,
    pub mean: Vec<f64>,
    /// Population standard deviation; constant columns use 1.0
    pub scale: Vec<f64>,
}

impl FeatureScaler {
    pub fn fit(feature_order: &[String], rows: &[Vec<f64>]) -> Result<Self> {
        if rows.is_empty() {
            return Err(HooplineError::Validation("cannot fit scaler on zero rows".to_string()));
        }
        let dim = feature_order.len();
        if let Some(idx) = rows.iter().position(|r| r.len() != dim) {
            return Err(HooplineError::SchemaMismatch(format!(
                "row {idx} has {} values, expected {dim}",
                rows[idx].len()
            )));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; dim];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = vec![0.0; dim];
        for row in rows {
            for ((s, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|s| {
                let sd = (s / n).sqrt();
                if sd > 0.0 && sd.is_finite() {
                    sd
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self {
            feature_order: feature_order.to_vec(),
            mean,
            scale,
        })
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.mean.len() {
            return Err(HooplineError::SchemaMismatch(format!(
                "scaler expects {} features, got {}",
                self.mean.len(),
                row.len()
            )));
        }
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform(&self, vector: &FeatureVector) -> Result<FeatureVector> {
        if vector.names != self.feature_order {
            return Err(HooplineError::SchemaMismatch(
                "feature vector order differs from scaler order".to_string(),
            ));
        }
        Ok(FeatureVector {
            names: vector.names.clone(),
            values: self.transform_row(&vector.values)?,
        })
    }

    pub fn transform_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HooplineError::ArtifactNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let scaler: Self = serde_json::from_str(&content)?;
        if scaler.mean.len() != scaler.feature_order.len()
            || scaler.scale.len() != scaler.feature_order.len()
        {
            return Err(HooplineError::SchemaMismatch(format!(
                "scaler {} has inconsistent lengths",
                path.display()
            )));
        }
        Ok(scaler)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
