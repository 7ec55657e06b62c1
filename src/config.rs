// src/config.rs

//! Construction options recognized by [`TabularExplainer`](crate::TabularExplainer).
//!
//! Every option is an explicit field; unknown keys in serialized
//! configuration are rejected rather than forwarded anywhere.

use crate::algorithms::kernel_shap::DEFAULT_VARYING_TOLERANCE;
use crate::algorithms::{KernelShapConfig, KernelShapSamples};
use crate::core::{ConfigError, Result};
use crate::utils::logit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The task type of the model being explained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Outputs are per-class probabilities.
    #[default]
    Classification,
    /// A single scalar output per row.
    Regression,
}

/// Transform applied to model outputs before the additive decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    #[default]
    Identity,
    /// Log-odds; only meaningful for probability outputs.
    Logit,
}

impl Link {
    #[inline]
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Link::Identity => value,
            Link::Logit => logit(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExplainerConfig {
    pub mode: Mode,
    /// Features left out of every explanation record.
    pub ignored_features: BTreeSet<String>,
    /// Background subsample size; the full training data when `None`.
    pub nsamples: Option<usize>,
    /// Coalitions evaluated per instance; `2 * M + 2048` when `None`.
    pub num_coalition_samples: Option<usize>,
    pub seed: u64,
    pub link: Link,
    /// Gaussian jitter on absent features when the background has one row.
    pub noise_std_dev: f64,
    /// Absolute distance under which an instance value counts as equal to a
    /// background value when deciding which features vary.
    pub varying_tolerance: f64,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        ExplainerConfig {
            mode: Mode::Classification,
            ignored_features: BTreeSet::new(),
            nsamples: None,
            num_coalition_samples: None,
            seed: 0,
            link: Link::Identity,
            noise_std_dev: 0.0,
            varying_tolerance: DEFAULT_VARYING_TOLERANCE,
        }
    }
}

impl ExplainerConfig {
    pub fn classification() -> Self {
        Self::default()
    }

    pub fn regression() -> Self {
        ExplainerConfig {
            mode: Mode::Regression,
            ..Self::default()
        }
    }

    /// Parses a JSON object, rejecting unknown keys and unsupported modes.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ExplainerConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_ignored_features<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.ignored_features = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_nsamples(mut self, n: usize) -> Self {
        self.nsamples = Some(n);
        self
    }

    pub fn with_num_coalition_samples(mut self, n: usize) -> Self {
        self.num_coalition_samples = Some(n);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    pub fn with_noise_std_dev(mut self, std_dev: f64) -> Self {
        self.noise_std_dev = std_dev;
        self
    }

    pub fn with_varying_tolerance(mut self, tolerance: f64) -> Self {
        self.varying_tolerance = tolerance;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.nsamples == Some(0) {
            return Err(ConfigError::NonPositive {
                parameter: "nsamples",
            }
            .into());
        }
        if self.num_coalition_samples == Some(0) {
            return Err(ConfigError::NonPositive {
                parameter: "num_coalition_samples",
            }
            .into());
        }
        if !self.noise_std_dev.is_finite() || self.noise_std_dev < 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "noise_std_dev",
                reason: format!("must be finite and >= 0, got {}", self.noise_std_dev),
            }
            .into());
        }
        if !self.varying_tolerance.is_finite() || self.varying_tolerance < 0.0 {
            return Err(ConfigError::InvalidParameter {
                parameter: "varying_tolerance",
                reason: format!("must be finite and >= 0, got {}", self.varying_tolerance),
            }
            .into());
        }
        if self.mode == Mode::Regression && self.link == Link::Logit {
            return Err(ConfigError::InvalidParameter {
                parameter: "link",
                reason: "the logit link requires classification outputs".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Settings handed to the attribution engine.
    pub fn kernel_config(&self) -> KernelShapConfig {
        KernelShapConfig {
            n_samples: match self.num_coalition_samples {
                Some(n) => KernelShapSamples::Fixed(n),
                None => KernelShapSamples::Auto,
            },
            noise_std_dev: self.noise_std_dev,
            seed: self.seed,
            link: self.link,
            varying_tolerance: self.varying_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShapError;

    #[test]
    fn parses_recognized_options() {
        let config = ExplainerConfig::from_json(
            r#"{"mode": "regression", "nsamples": 50, "num_coalition_samples": 256,
                "seed": 7, "ignored_features": ["zip"]}"#,
        )
        .unwrap();
        assert_eq!(config.mode, Mode::Regression);
        assert_eq!(config.nsamples, Some(50));
        assert_eq!(config.seed, 7);
        assert!(config.ignored_features.contains("zip"));
        assert!(matches!(
            config.kernel_config().n_samples,
            KernelShapSamples::Fixed(256)
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ExplainerConfig::from_json(r#"{"l1_reg": "auto"}"#).unwrap_err();
        assert!(matches!(err, ShapError::Config(ConfigError::Parse(_))));
    }

    #[test]
    fn unsupported_mode_is_rejected() {
        let err = ExplainerConfig::from_json(r#"{"mode": "ranking"}"#).unwrap_err();
        assert!(matches!(err, ShapError::Config(ConfigError::Parse(_))));
    }

    #[test]
    fn zero_sample_counts_are_rejected() {
        let err = ExplainerConfig::default().with_nsamples(0).validate().unwrap_err();
        assert!(matches!(
            err,
            ShapError::Config(ConfigError::NonPositive { parameter: "nsamples" })
        ));
        let err = ExplainerConfig::from_json(r#"{"num_coalition_samples": 0}"#).unwrap_err();
        assert!(matches!(
            err,
            ShapError::Config(ConfigError::NonPositive {
                parameter: "num_coalition_samples"
            })
        ));
    }

    #[test]
    fn negative_noise_is_rejected() {
        assert!(ExplainerConfig::default()
            .with_noise_std_dev(-1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn varying_tolerance_reaches_the_attributor() {
        let config = ExplainerConfig::from_json(r#"{"varying_tolerance": 0.5}"#).unwrap();
        assert_eq!(config.kernel_config().varying_tolerance, 0.5);
        assert_eq!(
            ExplainerConfig::default().kernel_config().varying_tolerance,
            DEFAULT_VARYING_TOLERANCE
        );
        let err = ExplainerConfig::default()
            .with_varying_tolerance(-1.0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ShapError::Config(ConfigError::InvalidParameter {
                parameter: "varying_tolerance",
                ..
            })
        ));
    }
}
