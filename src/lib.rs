// src/lib.rs

//! `shap_tabular` computes Kernel SHAP (SHapley Additive exPlanations) values
//! for individual predictions of opaque models over tabular data.
//!
//! Given a prediction function and background data, every feature of an
//! instance gets a score, and the scores add up to the gap between the
//! instance's prediction and the mean prediction over the background.
//!
//! ```no_run
//! use ndarray::{array, ArrayView2, Axis};
//! use shap_tabular::{ExplainerConfig, FeatureSchema, FnModel, LabelPolicy, TabularExplainer};
//!
//! # fn main() -> shap_tabular::Result<()> {
//! let model = FnModel::new(|x: ArrayView2<'_, f64>| Ok(x.sum_axis(Axis(1)).insert_axis(Axis(1))));
//! let training = array![[0.0, 1.0, 2.0], [1.0, 0.0, 1.0]];
//! let schema = FeatureSchema::from_names(["age", "income", "tenure"])?;
//!
//! let explainer = TabularExplainer::new(
//!     training.view(),
//!     schema,
//!     model,
//!     ExplainerConfig::regression().with_seed(7),
//! )?;
//! let explanations = explainer.explain(array![[3.0, 1.0, 0.0]].view(), LabelPolicy::TopPredicted)?;
//! for record in explanations.records() {
//!     for feature in &record.features {
//!         println!("{:>8} = {:<6} {:+.3}", feature.name, feature.value, feature.score);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod algorithms;
pub mod config;
pub mod core;
pub mod explainer;
pub mod traits;
pub mod utils;

// Re-export key components for easier use by library consumers
pub use crate::algorithms::{KernelAttributor, KernelShapConfig, KernelShapSamples};
pub use crate::config::{ExplainerConfig, Link, Mode};
pub use crate::core::{
    AttributionResult, AttributorError, BackgroundSet, ConfigError, Dataset, FeatureDescriptor,
    FeatureImportance, FeatureImportanceRecord, FeatureKind, FeatureSchema, FeatureScore,
    FeatureValue, Instance, Result, ShapError, ValidationError,
};
pub use crate::explainer::{
    ExplainOptions, ExplainReport, FailurePolicy, LabelPolicy, SkipReason, SkippedInstance,
    TabularExplainer,
};
pub use crate::traits::{FnModel, PredictModel, PredictModelMut, Serialized};
