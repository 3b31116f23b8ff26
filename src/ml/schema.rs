//! Feature-order descriptor and frame alignment.
//!
//! The feature order recorded at training time is authoritative. Incoming
//! feature maps are reindexed to it by name; columns that are absent stay
//! absent until the caller substitutes them explicitly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{HooplineError, Result};

/// Named feature values for one game as supplied by the feature provider.
pub type RawFeatures = BTreeMap<String, Value>;

/// Ordered numeric values with the names they correspond to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered list of feature names shared by every artifact and the scaler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    names: Vec<String>,
}

/// Result of reindexing a feature map to a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub names: Vec<String>,
    pub values: Vec<Option<f64>>,
    /// Schema columns absent from the input
    pub missing: Vec<String>,
    /// Input columns not in the schema (ignored)
    pub extra: Vec<String>,
}

impl Alignment {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Require every schema column to be present.
    pub fn into_complete(self) -> Result<FeatureVector> {
        if !self.missing.is_empty() {
            return Err(HooplineError::SchemaMismatch(format!(
                "missing feature columns: {}",
                self.missing.join(", ")
            )));
        }
        Ok(FeatureVector {
            names: self.names,
            values: self.values.into_iter().flatten().collect(),
        })
    }

    /// Substitute `fill` for every missing column, logging each one.
    pub fn fill_missing(self, fill: f64) -> FeatureVector {
        if !self.missing.is_empty() {
            warn!(
                count = self.missing.len(),
                fill,
                columns = %self.missing.join(","),
                "Substituting missing feature columns"
            );
        }
        FeatureVector {
            names: self.names,
            values: self.values.into_iter().map(|v| v.unwrap_or(fill)).collect(),
        }
    }
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(HooplineError::SchemaMismatch("feature order is empty".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(HooplineError::SchemaMismatch(format!(
                "duplicate feature name {dup}"
            )));
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(HooplineError::ArtifactNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let names: Vec<String> = serde_json::from_str(&content)?;
        Self::new(names)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.names)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reindex a feature map to this schema.
    ///
    /// Numbers and numeric strings are accepted; `null` counts as absent.
    /// Any other value is a `SchemaMismatch`.
    pub fn align(&self, raw: &RawFeatures) -> Result<Alignment> {
        let mut values = Vec::with_capacity(self.names.len());
        let mut missing = Vec::new();
        for name in &self.names {
            match raw.get(name) {
                None | Some(Value::Null) => {
                    missing.push(name.clone());
                    values.push(None);
                }
                Some(v) => values.push(Some(numeric(name, v)?)),
            }
        }
        let extra: Vec<String> = raw
            .keys()
            .filter(|k| !self.names.contains(k))
            .cloned()
            .collect();
        if !extra.is_empty() {
            debug!(columns = %extra.join(","), "Ignoring feature columns outside the schema");
        }
        Ok(Alignment {
            names: self.names.clone(),
            values,
            missing,
            extra,
        })
    }

    /// Verify a vector is laid out exactly in this schema's order.
    pub fn check(&self, vector: &FeatureVector) -> Result<()> {
        if vector.values.len() != self.names.len() || vector.names.len() != self.names.len() {
            return Err(HooplineError::SchemaMismatch(format!(
                "feature vector has {} values, schema has {}",
                vector.values.len(),
                self.names.len()
            )));
        }
        if let Some((i, (got, want))) = vector
            .names
            .iter()
            .zip(&self.names)
            .enumerate()
            .find(|(_, (g, w))| g != w)
        {
            return Err(HooplineError::SchemaMismatch(format!(
                "column {i} is {got}, schema expects {want}"
            )));
        }
        if let Some(i) = vector.values.iter().position(|v| !v.is_finite()) {
            return Err(HooplineError::SchemaMismatch(format!(
                "feature {} is not a finite number",
                self.names[i]
            )));
        }
        Ok(())
    }
}

fn numeric(name: &str, value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(HooplineError::SchemaMismatch(format!(
            "feature {name} is not numeric: {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec!["adj_oe".into(), "adj_de".into(), "pace".into()]).unwrap()
    }

    fn raw(v: Value) -> RawFeatures {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn reorders_by_name() {
        let a = schema()
            .align(&raw(json!({"pace": 70.0, "adj_oe": 110.0, "adj_de": "95.5", "extra": 1})))
            .unwrap();
        assert!(a.is_complete());
        assert_eq!(a.extra, vec!["extra".to_string()]);
        let v = a.into_complete().unwrap();
        assert_eq!(v.values, vec![110.0, 95.5, 70.0]);
        assert_eq!(v.names, schema().names());
    }

    #[test]
    fn missing_columns_are_explicit() {
        let a = schema().align(&raw(json!({"adj_oe": 100.0, "pace": null}))).unwrap();
        assert_eq!(a.missing, vec!["adj_de".to_string(), "pace".to_string()]);
        assert_eq!(a.values, vec![Some(100.0), None, None]);

        let err = a.clone().into_complete().unwrap_err();
        assert!(matches!(err, HooplineError::SchemaMismatch(_)));

        let filled = a.fill_missing(0.0);
        assert_eq!(filled.values, vec![100.0, 0.0, 0.0]);
    }

    #[test]
    fn non_numeric_is_schema_mismatch() {
        let err = schema()
            .align(&raw(json!({"adj_oe": "fast", "adj_de": 1, "pace": 2})))
            .unwrap_err();
        assert!(matches!(err, HooplineError::SchemaMismatch(_)));
    }

    #[test]
    fn check_rejects_reordered_vectors() {
        let v = FeatureVector {
            names: vec!["adj_de".into(), "adj_oe".into(), "pace".into()],
            values: vec![1.0, 2.0, 3.0],
        };
        assert!(schema().check(&v).is_err());
        let short = FeatureVector {
            names: vec!["adj_oe".into()],
            values: vec![1.0],
        };
        assert!(schema().check(&short).is_err());
    }

    #[test]
    fn rejects_duplicates_and_round_trips() {
        assert!(FeatureSchema::new(vec!["a".into(), "a".into()]).is_err());

        let path = std::env::temp_dir().join(format!("hoopline_schema_{}.json", std::process::id()));
        schema().to_file(&path).unwrap();
        let loaded = FeatureSchema::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, schema());
    }
}
