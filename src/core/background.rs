// src/core/background.rs
use crate::core::{ConfigError, Dataset, FeatureSchema, Result};
use ndarray::{Array1, ArrayView2, Axis};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

/// Above this many rows every coalition costs a lot of model calls.
const LARGE_BACKGROUND: usize = 100;

/// Reference rows used for the baseline and to fill absent features.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundSet {
    data: Dataset,
}

impl BackgroundSet {
    /// Copies `training_data`, or a seeded uniform subsample of `target_size`
    /// rows without replacement when that is smaller than the dataset.
    pub fn build(
        training_data: ArrayView2<'_, f64>,
        schema: &FeatureSchema,
        target_size: Option<usize>,
        seed: u64,
    ) -> Result<Self> {
        if target_size == Some(0) {
            return Err(ConfigError::NonPositive {
                parameter: "nsamples",
            }
            .into());
        }
        if training_data.nrows() == 0 {
            return Err(ConfigError::EmptyBackground.into());
        }
        if training_data.ncols() != schema.len() {
            return Err(ConfigError::SchemaMismatch {
                expected: schema.len(),
                actual: training_data.ncols(),
            }
            .into());
        }

        let data = match target_size {
            Some(n) if n < training_data.nrows() => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let mut rows = index::sample(&mut rng, training_data.nrows(), n).into_vec();
                rows.sort_unstable();
                training_data.select(Axis(0), &rows)
            }
            _ => training_data.to_owned(),
        };

        if data.nrows() > LARGE_BACKGROUND {
            warn!(
                rows = data.nrows(),
                "large background data can cause slow run times; consider setting `nsamples`"
            );
        }
        Ok(BackgroundSet { data })
    }

    pub fn data(&self) -> &Dataset {
        &self.data
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn num_features(&self) -> usize {
        self.data.ncols()
    }

    pub fn column_means(&self) -> Array1<f64> {
        self.data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.data.ncols()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShapError;
    use ndarray::Array2;

    fn training() -> (Dataset, FeatureSchema) {
        let data = Array2::from_shape_fn((20, 2), |(i, j)| (i * 10 + j) as f64);
        (data, FeatureSchema::from_names(["a", "b"]).unwrap())
    }

    #[test]
    fn full_dataset_when_no_target_size() {
        let (data, schema) = training();
        let bg = BackgroundSet::build(data.view(), &schema, None, 0).unwrap();
        assert_eq!(bg.data(), &data);
    }

    #[test]
    fn target_size_at_or_above_rows_keeps_everything() {
        let (data, schema) = training();
        let bg = BackgroundSet::build(data.view(), &schema, Some(50), 0).unwrap();
        assert_eq!(bg.nrows(), 20);
    }

    #[test]
    fn subsample_is_seeded_distinct_and_leaves_source_alone() {
        let (data, schema) = training();
        let before = data.clone();
        let a = BackgroundSet::build(data.view(), &schema, Some(5), 42).unwrap();
        let b = BackgroundSet::build(data.view(), &schema, Some(5), 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.nrows(), 5);
        assert_eq!(data, before);

        let mut firsts: Vec<f64> = a.data().column(0).to_vec();
        firsts.dedup();
        assert_eq!(firsts.len(), 5);
        assert!(firsts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn zero_target_size_is_a_config_error() {
        let (data, schema) = training();
        assert!(matches!(
            BackgroundSet::build(data.view(), &schema, Some(0), 0),
            Err(ShapError::Config(ConfigError::NonPositive { .. }))
        ));
    }

    #[test]
    fn schema_width_must_match() {
        let (data, _) = training();
        let schema = FeatureSchema::from_names(["a", "b", "c"]).unwrap();
        assert!(matches!(
            BackgroundSet::build(data.view(), &schema, None, 0),
            Err(ShapError::Config(ConfigError::SchemaMismatch {
                expected: 3,
                actual: 2
            }))
        ));
    }

    #[test]
    fn column_means() {
        let schema = FeatureSchema::from_names(["a", "b"]).unwrap();
        let data = ndarray::array![[0.0, 2.0], [2.0, 4.0]];
        let bg = BackgroundSet::build(data.view(), &schema, None, 0).unwrap();
        assert_eq!(bg.column_means(), ndarray::array![1.0, 3.0]);
    }
}
