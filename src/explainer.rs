// src/explainer.rs

//! Batch explanations for tabular models.
//!
//! [`TabularExplainer`] owns the background data and the model, resolves
//! which output to explain for each instance and turns raw attributions into
//! [`FeatureImportance`] records.

use crate::algorithms::kernel_shap::predict_checked;
use crate::algorithms::{KernelAttributor, KernelShapConfig};
use crate::config::{ExplainerConfig, Mode};
use crate::core::{
    ActiveFeatures, AttributionResult, AttributorError, BackgroundSet, ConfigError,
    FeatureImportance, FeatureSchema, FeatureValue, Result, ShapError, ValidationError,
};
use crate::traits::PredictModel;
use crate::utils::argmax;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Tolerance on class probability rows summing to one.
const PROBABILITY_SUM_TOLERANCE: f64 = 1e-3;

/// Which class to explain, per instance. Ignored in regression mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LabelPolicy {
    /// The class with the highest predicted probability (lowest index on ties).
    #[default]
    TopPredicted,
    /// The same class for every instance.
    Broadcast(usize),
    /// One class per instance, in instance order.
    PerInstance(Vec<usize>),
}

impl From<usize> for LabelPolicy {
    fn from(label: usize) -> Self {
        LabelPolicy::Broadcast(label)
    }
}

impl From<Vec<usize>> for LabelPolicy {
    fn from(labels: Vec<usize>) -> Self {
        LabelPolicy::PerInstance(labels)
    }
}

impl From<&[usize]> for LabelPolicy {
    fn from(labels: &[usize]) -> Self {
        LabelPolicy::PerInstance(labels.to_vec())
    }
}

impl From<Option<usize>> for LabelPolicy {
    fn from(label: Option<usize>) -> Self {
        label.map_or(LabelPolicy::TopPredicted, LabelPolicy::Broadcast)
    }
}

/// What to do when attributing one instance fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Fail the whole call with the offending instance index.
    #[default]
    Abort,
    /// Record the instance as skipped and keep going.
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExplainOptions {
    /// Order each record by descending absolute score.
    pub sort: bool,
    /// Explain instances on the rayon thread pool.
    pub parallel: bool,
    /// Instances not started by then are skipped; finished ones are kept.
    pub deadline: Option<Instant>,
    pub on_error: FailurePolicy,
}

impl Default for ExplainOptions {
    fn default() -> Self {
        ExplainOptions {
            sort: true,
            parallel: false,
            deadline: None,
            on_error: FailurePolicy::Abort,
        }
    }
}

impl ExplainOptions {
    pub fn sorted(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn on_error(mut self, policy: FailurePolicy) -> Self {
        self.on_error = policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    DeadlineExceeded,
    Failed(AttributorError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedInstance {
    pub index: usize,
    pub reason: SkipReason,
}

/// Records for the instances that were explained, plus the ones that were not.
#[derive(Debug, Clone)]
pub struct ExplainReport {
    pub importance: FeatureImportance,
    pub skipped: Vec<SkippedInstance>,
}

impl ExplainReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn into_importance(self) -> FeatureImportance {
        self.importance
    }
}

/// Picks the explained output per instance; chosen once from the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetResolver {
    Classification { num_classes: usize },
    Regression,
}

impl TargetResolver {
    /// Checks explicit labels up front; top-predicted labels are left to be
    /// resolved per instance so a failing prediction only affects its own row.
    fn resolve(&self, n: usize, policy: &LabelPolicy) -> Result<Labels> {
        let num_classes = match *self {
            TargetResolver::Regression => return Ok(Labels::Fixed(vec![None; n])),
            TargetResolver::Classification { num_classes } => num_classes,
        };
        let check = |index: usize, label: usize| -> Result<Option<usize>> {
            if label >= num_classes {
                return Err(ValidationError::LabelOutOfRange {
                    index,
                    label,
                    num_classes,
                }
                .into());
            }
            Ok(Some(label))
        };

        match policy {
            LabelPolicy::Broadcast(label) => (0..n)
                .map(|i| check(i, *label))
                .collect::<Result<_>>()
                .map(Labels::Fixed),
            LabelPolicy::PerInstance(labels) => {
                if labels.len() != n {
                    return Err(ValidationError::LabelCount {
                        expected: n,
                        actual: labels.len(),
                    }
                    .into());
                }
                labels
                    .iter()
                    .enumerate()
                    .map(|(i, &label)| check(i, label))
                    .collect::<Result<_>>()
                    .map(Labels::Fixed)
            }
            LabelPolicy::TopPredicted => Ok(Labels::TopPredicted { num_classes }),
        }
    }
}

/// Explained output per instance.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Labels {
    Fixed(Vec<Option<usize>>),
    TopPredicted { num_classes: usize },
}

impl Labels {
    fn for_instance<M: PredictModel + ?Sized>(
        &self,
        index: usize,
        instance: ArrayView1<'_, f64>,
        model: &M,
    ) -> std::result::Result<Option<usize>, AttributorError> {
        match self {
            Labels::Fixed(labels) => Ok(labels[index]),
            Labels::TopPredicted { num_classes } => {
                let scores =
                    predict_checked(model, instance.insert_axis(Axis(0)), Some(*num_classes))?;
                Ok(argmax(scores.row(0)))
            }
        }
    }
}

/// One instance's record, before it is appended to the result.
struct PreparedRecord {
    instance: Vec<FeatureValue>,
    target_label: Option<usize>,
    names: Vec<String>,
    values: Vec<FeatureValue>,
    scores: Vec<f64>,
}

enum Step {
    Done(PreparedRecord),
    Skipped(SkipReason),
}

/// Kernel SHAP explainer for a model over tabular data.
pub struct TabularExplainer<M> {
    model: M,
    schema: FeatureSchema,
    active: ActiveFeatures,
    background: BackgroundSet,
    expected_value: Array1<f64>,
    config: ExplainerConfig,
    kernel: KernelShapConfig,
    targets: TargetResolver,
}

impl<M: PredictModel> TabularExplainer<M> {
    /// Builds the background from `training_data` (subsampled to
    /// `config.nsamples` rows when set) and checks `model` against it.
    ///
    /// Every configuration problem surfaces here, including a target column
    /// listed among the ignored features.
    pub fn new(
        training_data: ArrayView2<'_, f64>,
        schema: FeatureSchema,
        model: M,
        config: ExplainerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let active = schema.active_features(&config.ignored_features)?;
        let background =
            BackgroundSet::build(training_data, &schema, config.nsamples, config.seed)?;

        let outputs = predict_checked(&model, background.data().view(), None).map_err(|e| {
            ConfigError::InvalidPredictor {
                reason: e.to_string(),
            }
        })?;
        let targets = match config.mode {
            Mode::Regression => {
                if outputs.ncols() != 1 {
                    return Err(ConfigError::InvalidPredictor {
                        reason: format!(
                            "regression models must return one output per row, got {}",
                            outputs.ncols()
                        ),
                    }
                    .into());
                }
                TargetResolver::Regression
            }
            Mode::Classification => {
                if outputs.ncols() < 2 {
                    return Err(ConfigError::InvalidPredictor {
                        reason: format!(
                            "classification models must return class probabilities, got {} output(s)",
                            outputs.ncols()
                        ),
                    }
                    .into());
                }
                let off = outputs
                    .rows()
                    .into_iter()
                    .filter(|row| (row.sum() - 1.0).abs() > PROBABILITY_SUM_TOLERANCE)
                    .count();
                if off > 0 {
                    warn!(
                        rows = off,
                        "class probabilities of some background rows do not sum to 1"
                    );
                }
                TargetResolver::Classification {
                    num_classes: outputs.ncols(),
                }
            }
        };
        let expected_value = outputs
            .mean_axis(Axis(0))
            .ok_or_else(|| ShapError::Internal("empty background predictions".to_string()))?;

        info!(
            features = schema.len(),
            active_features = active.count(),
            background_rows = background.nrows(),
            outputs = expected_value.len(),
            mode = ?config.mode,
            "kernel SHAP explainer ready"
        );

        Ok(TabularExplainer {
            model,
            schema,
            active,
            background,
            expected_value,
            kernel: config.kernel_config(),
            config,
            targets,
        })
    }

    /// Explains every row of `instances` with the default options: sorted,
    /// sequential, failing on the first misbehaving prediction.
    pub fn explain(
        &self,
        instances: ArrayView2<'_, f64>,
        labels: impl Into<LabelPolicy>,
    ) -> Result<FeatureImportance> {
        self.explain_with(instances, labels, &ExplainOptions::default())
            .map(ExplainReport::into_importance)
    }

    pub fn explain_with(
        &self,
        instances: ArrayView2<'_, f64>,
        labels: impl Into<LabelPolicy>,
        options: &ExplainOptions,
    ) -> Result<ExplainReport> {
        if instances.ncols() != self.schema.len() {
            return Err(ValidationError::FeatureCount {
                expected: self.schema.len(),
                actual: instances.ncols(),
            }
            .into());
        }
        let labels = self.targets.resolve(instances.nrows(), &labels.into())?;

        let attributor = self.attributor();
        let run = |index: usize| -> std::result::Result<Step, AttributorError> {
            if let Some(deadline) = options.deadline {
                if Instant::now() >= deadline {
                    return Ok(Step::Skipped(SkipReason::DeadlineExceeded));
                }
            }
            let instance = instances.row(index);
            let label = labels.for_instance(index, instance, &self.model)?;
            let prepared = self.prepare(&attributor, instance, label)?;
            debug!(instance = index, label = ?label, "explained instance");
            Ok(Step::Done(prepared))
        };

        let n = instances.nrows();
        let steps: Vec<std::result::Result<Step, AttributorError>> = if options.parallel {
            (0..n).into_par_iter().map(run).collect()
        } else {
            let mut steps = Vec::with_capacity(n);
            for index in 0..n {
                let step = run(index);
                let abort = step.is_err() && options.on_error == FailurePolicy::Abort;
                steps.push(step);
                if abort {
                    break;
                }
            }
            steps
        };

        let mut importance = FeatureImportance::with_capacity(self.config.mode, n);
        let mut skipped = Vec::new();
        for (index, step) in steps.into_iter().enumerate() {
            match step {
                Ok(Step::Done(r)) => {
                    importance.add(r.instance, r.target_label, r.names, r.values, r.scores, options.sort)?
                }
                Ok(Step::Skipped(reason)) => skipped.push(SkippedInstance { index, reason }),
                Err(e) => match options.on_error {
                    FailurePolicy::Abort => return Err(ShapError::attributor(index, e)),
                    FailurePolicy::Skip => {
                        warn!(instance = index, error = %e, "skipping instance");
                        skipped.push(SkippedInstance {
                            index,
                            reason: SkipReason::Failed(e),
                        });
                    }
                },
            }
        }
        if !skipped.is_empty() {
            warn!(
                skipped = skipped.len(),
                explained = importance.len(),
                "returning a partial explanation"
            );
        }

        Ok(ExplainReport {
            importance,
            skipped,
        })
    }

    /// Raw attribution of one output for a single instance, over all features.
    pub fn attribute(
        &self,
        instance: ArrayView1<'_, f64>,
        target: usize,
    ) -> Result<AttributionResult> {
        self.attributor()
            .attribute(instance, target)
            .map_err(|e| ShapError::attributor(0, e))
    }

    fn attributor(&self) -> KernelAttributor<'_, M> {
        KernelAttributor::new(
            &self.model,
            &self.background,
            self.expected_value.view(),
            &self.kernel,
        )
    }

    fn prepare(
        &self,
        attributor: &KernelAttributor<'_, M>,
        instance: ArrayView1<'_, f64>,
        label: Option<usize>,
    ) -> std::result::Result<PreparedRecord, AttributorError> {
        let attribution = attributor.attribute(instance, label.unwrap_or(0))?;

        let features = self.schema.features();
        let snapshot: Vec<FeatureValue> = features
            .iter()
            .zip(instance.iter())
            .map(|(descriptor, &value)| descriptor.decode(value))
            .collect();

        Ok(PreparedRecord {
            names: self.active.indices().map(|i| features[i].name.clone()).collect(),
            values: self.active.indices().map(|i| snapshot[i].clone()).collect(),
            scores: self.active.indices().map(|i| attribution.scores[i]).collect(),
            instance: snapshot,
            target_label: label,
        })
    }

    /// Mean model output over the background, per output column.
    pub fn expected_value(&self) -> ArrayView1<'_, f64> {
        self.expected_value.view()
    }

    pub fn num_outputs(&self) -> usize {
        self.expected_value.len()
    }

    pub fn background(&self) -> &BackgroundSet {
        &self.background
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn config(&self) -> &ExplainerConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FnModel;
    use ndarray::{array, Array2};

    /// Two-class model: P(class 1) = clamp(x0 / 10).
    fn two_class() -> impl PredictModel {
        FnModel::new(|x: ArrayView2<'_, f64>| {
            let mut out = Array2::zeros((x.nrows(), 2));
            for (i, row) in x.rows().into_iter().enumerate() {
                let p = (row[0] / 10.0).clamp(0.0, 1.0);
                out[[i, 0]] = 1.0 - p;
                out[[i, 1]] = p;
            }
            Ok(out)
        })
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::from_names(["a", "b"]).unwrap()
    }

    fn training() -> Array2<f64> {
        array![[2.0, 0.0], [4.0, 1.0], [6.0, 0.0]]
    }

    #[test]
    fn broadcast_label_applies_to_every_instance() {
        let explainer = TabularExplainer::new(
            training().view(),
            schema(),
            two_class(),
            ExplainerConfig::classification(),
        )
        .unwrap();
        let result = explainer
            .explain(array![[1.0, 1.0], [9.0, 0.0]].view(), LabelPolicy::Broadcast(1))
            .unwrap();
        assert!(result.iter().all(|r| r.target_label == Some(1)));
    }

    #[test]
    fn label_count_must_match_instances() {
        let explainer = TabularExplainer::new(
            training().view(),
            schema(),
            two_class(),
            ExplainerConfig::classification(),
        )
        .unwrap();
        let err = explainer
            .explain(array![[1.0, 1.0], [9.0, 0.0]].view(), vec![0_usize])
            .unwrap_err();
        assert!(matches!(
            err,
            ShapError::Validation(ValidationError::LabelCount {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let explainer = TabularExplainer::new(
            training().view(),
            schema(),
            two_class(),
            ExplainerConfig::classification(),
        )
        .unwrap();
        let err = explainer
            .explain(array![[1.0, 1.0]].view(), LabelPolicy::Broadcast(2))
            .unwrap_err();
        assert_eq!(err.instance_index(), Some(0));
    }

    #[test]
    fn instance_width_is_validated() {
        let explainer = TabularExplainer::new(
            training().view(),
            schema(),
            two_class(),
            ExplainerConfig::classification(),
        )
        .unwrap();
        assert!(matches!(
            explainer.explain(array![[1.0, 2.0, 3.0]].view(), LabelPolicy::TopPredicted),
            Err(ShapError::Validation(ValidationError::FeatureCount { .. }))
        ));
    }

    #[test]
    fn regression_requires_a_single_output() {
        let result = TabularExplainer::new(
            training().view(),
            schema(),
            two_class(),
            ExplainerConfig::regression(),
        );
        assert!(matches!(
            result,
            Err(ShapError::Config(ConfigError::InvalidPredictor { .. }))
        ));
    }

    #[test]
    fn classification_requires_probabilities() {
        let single = FnModel::new(|x: ArrayView2<'_, f64>| Ok(Array2::zeros((x.nrows(), 1))));
        assert!(matches!(
            TabularExplainer::new(
                training().view(),
                schema(),
                single,
                ExplainerConfig::classification()
            ),
            Err(ShapError::Config(ConfigError::InvalidPredictor { .. }))
        ));
    }

    #[test]
    fn broken_predictor_fails_at_construction() {
        let broken = FnModel::new(|x: ArrayView2<'_, f64>| {
            Ok(Array2::from_elem((x.nrows(), 2), f64::INFINITY))
        });
        let err = TabularExplainer::new(
            training().view(),
            schema(),
            broken,
            ExplainerConfig::classification(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("non-finite"));
    }

    #[test]
    fn empty_batch_gives_empty_result() {
        let explainer = TabularExplainer::new(
            training().view(),
            schema(),
            two_class(),
            ExplainerConfig::classification(),
        )
        .unwrap();
        let result = explainer
            .explain(Array2::<f64>::zeros((0, 2)).view(), LabelPolicy::TopPredicted)
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.mode(), Mode::Classification);
    }

    #[test]
    fn unsorted_records_follow_schema_order() {
        let explainer = TabularExplainer::new(
            training().view(),
            schema(),
            two_class(),
            ExplainerConfig::classification(),
        )
        .unwrap();
        let report = explainer
            .explain_with(
                array![[9.0, 5.0]].view(),
                LabelPolicy::Broadcast(1),
                &ExplainOptions::default().sorted(false),
            )
            .unwrap();
        let names: Vec<&str> = report.importance.records()[0].feature_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(report.is_complete());
    }

    #[test]
    fn categorical_values_are_decoded_in_records() {
        let schema = FeatureSchema::new(
            vec![
                crate::core::FeatureDescriptor::continuous("a"),
                crate::core::FeatureDescriptor::categorical("color", ["red", "blue"]),
            ],
            None,
        )
        .unwrap();
        let explainer = TabularExplainer::new(
            training().view(),
            schema,
            two_class(),
            ExplainerConfig::classification(),
        )
        .unwrap();
        let result = explainer
            .explain(array![[5.0, 1.0]].view(), LabelPolicy::Broadcast(0))
            .unwrap();
        let record = &result.records()[0];
        assert_eq!(record.instance[1], FeatureValue::Categorical("blue".into()));
        let color = record.features.iter().find(|f| f.name == "color").unwrap();
        assert_eq!(color.value, FeatureValue::Categorical("blue".into()));
    }
}
