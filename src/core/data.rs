// src/core/data.rs
use ndarray::{Array1, Array2};
use std::fmt;

/// A single data instance (a row of encoded feature values).
pub type Instance = Array1<f64>;

/// Multiple instances, e.g. the rows to explain or the background data.
pub type Dataset = Array2<f64>;

/// Raw attribution output for one (instance, target) pair.
///
/// Values live in link space: with the identity link `prediction` is the
/// model output for `target` and `base_value` the mean background output.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionResult {
    /// One score per feature, in schema order.
    pub scores: Array1<f64>,
    /// The baseline term `phi_0`, i.e. `link(E[f(background)])`.
    pub base_value: f64,
    /// `link(f(instance))` for the explained output.
    pub prediction: f64,
    /// Output column that was explained.
    pub target: usize,
}

impl AttributionResult {
    /// `sum(scores) - (prediction - base_value)`; zero up to rounding.
    pub fn efficiency_gap(&self) -> f64 {
        self.scores.sum() - (self.prediction - self.base_value)
    }
}

impl fmt::Display for AttributionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Attribution (output {}):", self.target)?;
        writeln!(f, "  Base value:  {:.4}", self.base_value)?;
        writeln!(f, "  Prediction:  {:.4}", self.prediction)?;
        writeln!(f, "  Scores:")?;
        for (i, val) in self.scores.iter().take(10).enumerate() {
            writeln!(f, "    Feature {}: {:.4}", i, val)?;
        }
        if self.scores.len() > 10 {
            writeln!(f, "    ...")?;
        }
        Ok(())
    }
}
