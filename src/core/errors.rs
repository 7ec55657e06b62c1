// src/core/errors.rs
use thiserror::Error;

/// Invalid construction options. Only raised while building an explainer,
/// never from `explain`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("parameter `{parameter}` must be a positive integer")]
    NonPositive { parameter: &'static str },

    #[error("invalid parameter `{parameter}`: {reason}")]
    InvalidParameter { parameter: &'static str, reason: String },

    #[error("the target column `{target}` cannot be in the ignored feature list")]
    TargetIgnored { target: String },

    #[error("ignored feature `{name}` is not part of the feature schema")]
    UnknownFeature { name: String },

    #[error("background data cannot be empty")]
    EmptyBackground,

    #[error("data has {actual} features, but the schema declares {expected}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("invalid feature schema: {0}")]
    InvalidSchema(String),

    #[error("prediction function failed the construction check: {reason}")]
    InvalidPredictor { reason: String },

    #[error("could not parse configuration: {0}")]
    Parse(String),
}

/// Malformed call-time arguments. Raised before any attribution work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("expected {expected} labels (one per instance), got {actual}")]
    LabelCount { expected: usize, actual: usize },

    #[error("label {label} for instance {index} is out of range for {num_classes} classes")]
    LabelOutOfRange {
        index: usize,
        label: usize,
        num_classes: usize,
    },

    #[error("instances have {actual} features, but the schema declares {expected}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("record sequences differ in length: {names} names, {values} values, {scores} scores")]
    LengthMismatch {
        names: usize,
        values: usize,
        scores: usize,
    },
}

/// The prediction capability misbehaved, or the regression could not be
/// solved, while attributing a single instance.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttributorError {
    #[error("prediction function failed: {0}")]
    PredictionFailed(String),

    #[error("prediction returned {actual} rows for a batch of {expected}")]
    BatchSizeMismatch { expected: usize, actual: usize },

    #[error("prediction returned {actual} outputs per row, expected {expected}")]
    OutputWidthMismatch { expected: usize, actual: usize },

    #[error("prediction returned a non-finite value at row {row}, output {output}")]
    NonFinite { row: usize, output: usize },

    #[error("instance has {actual} features, but the background has {expected}")]
    InstanceWidth { expected: usize, actual: usize },

    #[error("weighted least squares failed: {0}")]
    Solver(String),
}

#[derive(Error, Debug)]
pub enum ShapError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("attribution failed for instance {instance}: {source}")]
    Attributor {
        instance: usize,
        #[source]
        source: AttributorError,
    },

    #[error("ndarray shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ShapError {
    pub(crate) fn attributor(instance: usize, source: AttributorError) -> Self {
        ShapError::Attributor { instance, source }
    }

    /// Index of the offending instance, when the error is tied to one.
    pub fn instance_index(&self) -> Option<usize> {
        match self {
            ShapError::Attributor { instance, .. } => Some(*instance),
            ShapError::Validation(ValidationError::LabelOutOfRange { index, .. }) => Some(*index),
            _ => None,
        }
    }
}

// Convenience type alias for Result
pub type Result<T> = std::result::Result<T, ShapError>;
