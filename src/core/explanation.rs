// src/core/explanation.rs
use crate::config::Mode;
use crate::core::{FeatureValue, Result, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One `(feature, value, score)` triple of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub name: String,
    pub value: FeatureValue,
    pub score: f64,
}

/// The explanation of a single instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportanceRecord {
    /// Every feature value of the explained instance, ignored ones included.
    pub instance: Vec<FeatureValue>,
    /// Explained class; `None` for regression.
    pub target_label: Option<usize>,
    pub features: Vec<FeatureScore>,
}

impl FeatureImportanceRecord {
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    pub fn scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.features.iter().map(|f| f.score)
    }

    pub fn score_of(&self, name: &str) -> Option<f64> {
        self.features.iter().find(|f| f.name == name).map(|f| f.score)
    }

    /// The first `k` triples; the most important ones when the record is sorted.
    pub fn top_k(&self, k: usize) -> &[FeatureScore] {
        &self.features[..k.min(self.features.len())]
    }

    pub fn total_score(&self) -> f64 {
        self.scores().sum()
    }
}

/// Ordered, append-only collection of per-instance records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    mode: Mode,
    records: Vec<FeatureImportanceRecord>,
}

impl FeatureImportance {
    pub fn new(mode: Mode) -> Self {
        FeatureImportance {
            mode,
            records: Vec::new(),
        }
    }

    pub(crate) fn with_capacity(mode: Mode, capacity: usize) -> Self {
        FeatureImportance {
            mode,
            records: Vec::with_capacity(capacity),
        }
    }

    /// Appends one record. With `sort` the triples are ordered by descending
    /// absolute score; equal magnitudes keep their input order.
    pub fn add(
        &mut self,
        instance: Vec<FeatureValue>,
        target_label: Option<usize>,
        feature_names: Vec<String>,
        feature_values: Vec<FeatureValue>,
        scores: Vec<f64>,
        sort: bool,
    ) -> Result<()> {
        if feature_names.len() != feature_values.len() || feature_names.len() != scores.len() {
            return Err(ValidationError::LengthMismatch {
                names: feature_names.len(),
                values: feature_values.len(),
                scores: scores.len(),
            }
            .into());
        }
        let mut features: Vec<FeatureScore> = feature_names
            .into_iter()
            .zip(feature_values)
            .zip(scores)
            .map(|((name, value), score)| FeatureScore { name, value, score })
            .collect();
        if sort {
            // `sort_by` is stable
            features.sort_by(|a, b| b.score.abs().total_cmp(&a.score.abs()));
        }
        self.records.push(FeatureImportanceRecord {
            instance,
            target_label,
            features,
        });
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn records(&self) -> &[FeatureImportanceRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeatureImportanceRecord> {
        self.records.iter()
    }

    pub fn get(&self, index: usize) -> Option<&FeatureImportanceRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<'a> IntoIterator for &'a FeatureImportance {
    type Item = &'a FeatureImportanceRecord;
    type IntoIter = std::slice::Iter<'a, FeatureImportanceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl fmt::Display for FeatureImportance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, record) in self.records.iter().enumerate() {
            match record.target_label {
                Some(label) => writeln!(f, "Instance {} (label {}):", i, label)?,
                None => writeln!(f, "Instance {}:", i)?,
            }
            let width = record
                .features
                .iter()
                .map(|s| s.name.len())
                .max()
                .unwrap_or(0);
            for s in &record.features {
                writeln!(
                    f,
                    "  {:<width$}  {:>12}  {:+.4}",
                    s.name,
                    s.value.to_string(),
                    s.score,
                    width = width
                )?;
            }
        }
        Ok(())
    }
}
