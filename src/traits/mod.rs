// src/traits/mod.rs
use crate::core::{Result, ShapError};
use ndarray::{Array2, ArrayView2};
use std::sync::Mutex;

/// The model being explained.
///
/// `predict` maps a batch of rows to one row of outputs per input row:
/// class probabilities for classification, a single column for regression.
/// Implementations must accept batches of any size >= 1 and be callable from
/// several threads at once; wrap a model that is not re-entrant in
/// [`Serialized`].
pub trait PredictModel: Sync {
    fn predict(&self, instances: ArrayView2<'_, f64>) -> Result<Array2<f64>>;
}

impl<M: PredictModel + ?Sized> PredictModel for &M {
    fn predict(&self, instances: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        (**self).predict(instances)
    }
}

impl<M: PredictModel + ?Sized> PredictModel for Box<M> {
    fn predict(&self, instances: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        (**self).predict(instances)
    }
}

/// Adapts a closure into a [`PredictModel`].
pub struct FnModel<F>(F);

impl<F> FnModel<F>
where
    F: Fn(ArrayView2<'_, f64>) -> Result<Array2<f64>> + Sync,
{
    pub fn new(predict: F) -> Self {
        FnModel(predict)
    }
}

impl<F> PredictModel for FnModel<F>
where
    F: Fn(ArrayView2<'_, f64>) -> Result<Array2<f64>> + Sync,
{
    fn predict(&self, instances: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        (self.0)(instances)
    }
}

/// Funnels every call through a single lock, for models that cannot be
/// invoked concurrently.
pub struct Serialized<M> {
    inner: Mutex<M>,
}

impl<M> Serialized<M> {
    pub fn new(model: M) -> Self {
        Serialized {
            inner: Mutex::new(model),
        }
    }

    pub fn into_inner(self) -> M {
        match self.inner.into_inner() {
            Ok(model) => model,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Prediction for models that need `&mut self`, e.g. to reuse scratch buffers.
pub trait PredictModelMut: Send {
    fn predict_mut(&mut self, instances: ArrayView2<'_, f64>) -> Result<Array2<f64>>;
}

impl<M: PredictModelMut> PredictModel for Serialized<M> {
    fn predict(&self, instances: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let mut model = self
            .inner
            .lock()
            .map_err(|_| ShapError::Internal("prediction lock poisoned".to_string()))?;
        model.predict_mut(instances)
    }
}
