// src/algorithms/kernel_shap.rs

use crate::algorithms::coalition::CoalitionPlan;
use crate::algorithms::solver::solve_constrained;
use crate::config::Link;
use crate::core::{AttributionResult, AttributorError, BackgroundSet};
use crate::traits::PredictModel;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

/// Feature counts up to this size cap the budget at `2^M - 2`.
const MAX_ENUMERABLE_FEATURES: usize = 30;

/// Scores smaller than this are reported as exactly zero.
const ZERO_SNAP: f64 = 1e-10;

/// Default absolute distance below which a background value counts as equal
/// to the instance value.
pub const DEFAULT_VARYING_TOLERANCE: f64 = 1e-8;

/// Configuration for the KernelSHAP attributor.
#[derive(Debug, Clone)]
pub struct KernelShapConfig {
    pub n_samples: KernelShapSamples,
    pub noise_std_dev: f64,
    pub seed: u64,
    pub link: Link,
    /// Absolute tolerance used to decide whether a feature varies.
    pub varying_tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelShapSamples {
    /// `2 * M + 2048` coalitions for `M` varying features.
    Auto,
    Fixed(usize),
}

impl Default for KernelShapConfig {
    fn default() -> Self {
        KernelShapConfig {
            n_samples: KernelShapSamples::Auto,
            noise_std_dev: 0.0,
            seed: 0,
            link: Link::Identity,
            varying_tolerance: DEFAULT_VARYING_TOLERANCE,
        }
    }
}

/// Calls `model` and checks the shape and finiteness of what comes back.
pub(crate) fn predict_checked<M: PredictModel + ?Sized>(
    model: &M,
    batch: ArrayView2<'_, f64>,
    width: Option<usize>,
) -> Result<Array2<f64>, AttributorError> {
    let outputs = model
        .predict(batch)
        .map_err(|e| AttributorError::PredictionFailed(e.to_string()))?;
    if outputs.nrows() != batch.nrows() {
        return Err(AttributorError::BatchSizeMismatch {
            expected: batch.nrows(),
            actual: outputs.nrows(),
        });
    }
    if let Some(expected) = width {
        if outputs.ncols() != expected {
            return Err(AttributorError::OutputWidthMismatch {
                expected,
                actual: outputs.ncols(),
            });
        }
    }
    if let Some(((row, output), _)) = outputs.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(AttributorError::NonFinite { row, output });
    }
    Ok(outputs)
}

/// Approximates Shapley values of one instance by weighted linear regression
/// over sampled feature coalitions.
///
/// Absent features take their values from every background row in turn and
/// the model outputs are averaged, so `v(S)` estimates the expected output
/// when only the features in `S` are known.
#[derive(Debug)]
pub struct KernelAttributor<'a, M: ?Sized> {
    model: &'a M,
    background: &'a BackgroundSet,
    expected_value: ArrayView1<'a, f64>,
    config: &'a KernelShapConfig,
}

impl<'a, M: PredictModel + ?Sized> KernelAttributor<'a, M> {
    /// `expected_value` holds the mean model output over `background`, one
    /// entry per output column.
    pub fn new(
        model: &'a M,
        background: &'a BackgroundSet,
        expected_value: ArrayView1<'a, f64>,
        config: &'a KernelShapConfig,
    ) -> Self {
        KernelAttributor {
            model,
            background,
            expected_value,
            config,
        }
    }

    pub fn num_outputs(&self) -> usize {
        self.expected_value.len()
    }

    /// Attributes output `target` of the model at `instance` to its features.
    ///
    /// The scores always satisfy `sum(scores) == prediction - base_value`
    /// up to rounding. Features that equal every background row are never
    /// varied and score exactly zero.
    pub fn attribute(
        &self,
        instance: ArrayView1<'_, f64>,
        target: usize,
    ) -> Result<AttributionResult, AttributorError> {
        let n_features = self.background.num_features();
        if instance.len() != n_features {
            return Err(AttributorError::InstanceWidth {
                expected: n_features,
                actual: instance.len(),
            });
        }
        let n_outputs = self.num_outputs();
        if target >= n_outputs {
            return Err(AttributorError::OutputWidthMismatch {
                expected: target + 1,
                actual: n_outputs,
            });
        }

        let link = self.config.link;
        let base_value = link.apply(self.expected_value[target]);
        let instance_output = predict_checked(
            self.model,
            instance.insert_axis(Axis(0)),
            Some(n_outputs),
        )?;
        let prediction = link.apply(instance_output[[0, target]]);
        let total = prediction - base_value;

        let mut varying = self.varying_features(instance, self.config.varying_tolerance);
        if varying.is_empty() && self.config.varying_tolerance > 0.0 {
            // every difference was within the tolerance; fall back to exact equality
            varying = self.varying_features(instance, 0.0);
        }
        let mut scores = Array1::zeros(n_features);

        match varying.len() {
            0 => {
                // The instance matches every background row, so its output
                // can only differ from the mean if the model is not a function
                // of its input.
                if total.abs() > ZERO_SNAP * prediction.abs().max(1.0) {
                    return Err(AttributorError::Solver(format!(
                        "instance equals every background row but its output differs from the \
                         expected value by {}",
                        total
                    )));
                }
            }
            1 => scores[varying[0]] = total,
            m => {
                let budget = self.sample_budget(m);
                let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
                let plan = CoalitionPlan::build(m, budget, &mut rng);
                debug!(
                    varying = m,
                    budget,
                    coalitions = plan.len(),
                    full_subset_sizes = plan.full_subset_sizes,
                    "sampled coalitions"
                );

                let values = self.coalition_values(instance, &varying, &plan, target, &mut rng)?;
                let targets = values.mapv(|v| link.apply(v) - base_value);
                let phi =
                    solve_constrained(plan.masks.view(), targets.view(), plan.weights.view(), total)?;
                for (&feature, &value) in varying.iter().zip(phi.iter()) {
                    scores[feature] = value;
                }
            }
        }

        scores.mapv_inplace(|v: f64| if v.abs() < ZERO_SNAP { 0.0 } else { v });

        Ok(AttributionResult {
            scores,
            base_value,
            prediction,
            target,
        })
    }

    /// Features whose instance value is more than `tolerance` away from at
    /// least one background row.
    fn varying_features(&self, instance: ArrayView1<'_, f64>, tolerance: f64) -> Vec<usize> {
        let data = self.background.data();
        (0..instance.len())
            .filter(|&j| {
                let x = instance[j];
                data.column(j).iter().any(|&b| (x - b).abs() > tolerance)
            })
            .collect()
    }

    fn sample_budget(&self, num_varying: usize) -> usize {
        let requested = match self.config.n_samples {
            KernelShapSamples::Auto => 2 * num_varying + 2048,
            KernelShapSamples::Fixed(n) => n,
        };
        if num_varying <= MAX_ENUMERABLE_FEATURES {
            requested.min((1_usize << num_varying) - 2)
        } else {
            requested
        }
    }

    /// Mean model output for `target` over the background, per coalition.
    fn coalition_values(
        &self,
        instance: ArrayView1<'_, f64>,
        varying: &[usize],
        plan: &CoalitionPlan,
        target: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<Array1<f64>, AttributorError> {
        let background = self.background.data();
        let n_background = background.nrows();
        let jitter = n_background == 1 && self.config.noise_std_dev > 0.0;

        let mut synthetic = Array2::zeros((plan.len() * n_background, instance.len()));
        for (k, mask) in plan.masks.rows().into_iter().enumerate() {
            for (b, background_row) in background.rows().into_iter().enumerate() {
                let mut row = synthetic.row_mut(k * n_background + b);
                row.assign(&background_row);
                for (&feature, &present) in varying.iter().zip(mask.iter()) {
                    if present == 1.0 {
                        row[feature] = instance[feature];
                    } else if jitter {
                        let noise: f64 = StandardNormal.sample(rng);
                        row[feature] += noise * self.config.noise_std_dev;
                    }
                }
            }
        }

        let outputs = predict_checked(self.model, synthetic.view(), Some(self.num_outputs()))?;
        let column = outputs.column(target);
        let values = Array1::from_shape_fn(plan.len(), |k| {
            let start = k * n_background;
            column
                .slice(ndarray::s![start..start + n_background])
                .mean()
                .unwrap_or(0.0)
        });
        Ok(values)
    }
}
