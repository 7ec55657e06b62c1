// src/core/schema.rs
use crate::core::errors::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// How a column is encoded in an [`Instance`](crate::core::Instance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Continuous,
    /// Values are codes indexing into `categories`.
    Categorical { categories: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureDescriptor {
    pub fn continuous(name: impl Into<String>) -> Self {
        FeatureDescriptor {
            name: name.into(),
            kind: FeatureKind::Continuous,
        }
    }

    pub fn categorical<S: Into<String>>(
        name: impl Into<String>,
        categories: impl IntoIterator<Item = S>,
    ) -> Self {
        FeatureDescriptor {
            name: name.into(),
            kind: FeatureKind::Categorical {
                categories: categories.into_iter().map(Into::into).collect(),
            },
        }
    }

    /// Turns an encoded value back into what a reader expects to see.
    pub fn decode(&self, encoded: f64) -> FeatureValue {
        match &self.kind {
            FeatureKind::Continuous => FeatureValue::Numeric(encoded),
            FeatureKind::Categorical { categories } => {
                let in_range = encoded.is_finite()
                    && encoded >= 0.0
                    && encoded.fract() == 0.0
                    && (encoded as usize) < categories.len();
                if in_range {
                    FeatureValue::Categorical(categories[encoded as usize].clone())
                } else {
                    FeatureValue::Numeric(encoded)
                }
            }
        }
    }
}

/// Display form of a feature value inside an explanation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Numeric(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Categorical(v.to_string())
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Numeric(v) => fmt::Display::fmt(v, f),
            FeatureValue::Categorical(s) => f.pad(s),
        }
    }
}

/// Ordered feature descriptors of the tabular data, plus the optional name
/// of the target column (which is never one of the features).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Vec<FeatureDescriptor>,
    target_column: Option<String>,
}

impl FeatureSchema {
    pub fn new(features: Vec<FeatureDescriptor>, target_column: Option<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(features.len());
        for feature in &features {
            if feature.name.is_empty() {
                return Err(ConfigError::InvalidSchema("feature names cannot be empty".into()).into());
            }
            if !seen.insert(feature.name.as_str()) {
                return Err(ConfigError::InvalidSchema(format!(
                    "duplicate feature name `{}`",
                    feature.name
                ))
                .into());
            }
        }
        if let Some(target) = &target_column {
            if seen.contains(target.as_str()) {
                return Err(ConfigError::InvalidSchema(format!(
                    "target column `{}` is also listed as a feature",
                    target
                ))
                .into());
            }
        }
        Ok(FeatureSchema {
            features,
            target_column,
        })
    }

    /// Schema of continuous features with the given names.
    pub fn from_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self> {
        Self::new(
            names.into_iter().map(FeatureDescriptor::continuous).collect(),
            None,
        )
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Result<Self> {
        self.target_column = Some(target.into());
        Self::new(self.features, self.target_column)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[FeatureDescriptor] {
        &self.features
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }

    pub fn target_column(&self) -> Option<&str> {
        self.target_column.as_deref()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    /// Derives the mask of features that appear in explanations.
    ///
    /// Ignoring the target column, or a name the schema does not know, is a
    /// construction error.
    pub fn active_features(&self, ignored: &BTreeSet<String>) -> Result<ActiveFeatures> {
        if let Some(target) = &self.target_column {
            if ignored.contains(target) {
                return Err(ConfigError::TargetIgnored {
                    target: target.clone(),
                }
                .into());
            }
        }
        if let Some(unknown) = ignored.iter().find(|name| self.index_of(name).is_none()) {
            return Err(ConfigError::UnknownFeature {
                name: unknown.clone(),
            }
            .into());
        }
        let mask = self
            .features
            .iter()
            .map(|f| !ignored.contains(&f.name))
            .collect();
        Ok(ActiveFeatures { mask })
    }
}

/// Per-feature "shown in explanations" mask, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFeatures {
    mask: Vec<bool>,
}

impl ActiveFeatures {
    pub fn is_active(&self, index: usize) -> bool {
        self.mask.get(index).copied().unwrap_or(false)
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, &active)| active.then_some(i))
    }

    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&active| active).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ignored(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn active_mask_drops_ignored_features() {
        let schema = FeatureSchema::from_names(["age", "income", "zip"]).unwrap();
        let active = schema.active_features(&ignored(&["zip"])).unwrap();
        assert_eq!(active.indices().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(active.count(), 2);
        assert!(!active.is_active(2));
    }

    #[test]
    fn ignoring_target_is_rejected() {
        let schema = FeatureSchema::from_names(["a", "b"])
            .unwrap()
            .with_target("label")
            .unwrap();
        let err = schema.active_features(&ignored(&["label"])).unwrap_err();
        assert!(matches!(
            err,
            crate::ShapError::Config(ConfigError::TargetIgnored { ref target }) if target == "label"
        ));
    }

    #[test]
    fn unknown_ignored_feature_is_rejected() {
        let schema = FeatureSchema::from_names(["a", "b"]).unwrap();
        assert!(matches!(
            schema.active_features(&ignored(&["c"])),
            Err(crate::ShapError::Config(ConfigError::UnknownFeature { .. }))
        ));
    }

    #[test]
    fn names_follow_schema_order() {
        let schema = FeatureSchema::from_names(["age", "income", "zip"]).unwrap();
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["age", "income", "zip"]);
        assert_eq!(schema.index_of("zip"), Some(2));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        assert!(FeatureSchema::from_names(["a", "a"]).is_err());
    }

    #[test]
    fn categorical_codes_decode_to_labels() {
        let color = FeatureDescriptor::categorical("color", ["red", "green"]);
        assert_eq!(color.decode(1.0), FeatureValue::Categorical("green".into()));
        assert_eq!(color.decode(7.0), FeatureValue::Numeric(7.0));
        assert_eq!(color.decode(0.5), FeatureValue::Numeric(0.5));
    }
}
