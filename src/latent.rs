use crate::error::FitError;
use crate::fit::Method;
use crate::fit::bbvi::QNormal;
use crate::prior::{Prior, PriorDensity};

use ndarray::{Array1, Array2};

/// One latent variable: a named model parameter with a prior, a link pair,
/// and the estimation artifacts attached to it after a fit.
#[derive(Clone, Debug, PartialEq)]
pub struct LatentVariable {
    name: String,
    index: usize,
    prior: Prior,
    start: f64,
    value: Option<f64>,
    std: Option<f64>,
    sample: Option<Array1<f64>>,
    q: QNormal,
}

impl LatentVariable {
    fn new(name: String, index: usize, prior: Prior, start: f64) -> Self {
        Self {
            name,
            index,
            prior,
            start,
            value: None,
            std: None,
            sample: None,
            q: QNormal::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn prior(&self) -> &Prior {
        &self.prior
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    /// Current unconstrained value, falling back to the declared start.
    pub fn value_raw(&self) -> f64 {
        self.value.unwrap_or(self.start)
    }

    /// Current value on the natural scale.
    pub fn value_transformed(&self) -> f64 {
        self.prior.transform(self.value_raw())
    }

    pub fn std(&self) -> Option<f64> {
        self.std
    }

    /// Posterior sample chain on the natural scale, when the variable was
    /// estimated by a sampling method.
    pub fn sample(&self) -> Option<&Array1<f64>> {
        self.sample.as_ref()
    }

    /// Approximating posterior used by the variational engine; replaced with
    /// its converged form after a BBVI fit.
    pub fn q(&self) -> &QNormal {
        &self.q
    }
}

/// Complete replacement record an estimator hands back after a successful
/// run. The dispatcher applies it to the registry in one step; estimators
/// never write to the registry mid-computation.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistryUpdate {
    pub values: Array1<f64>,
    pub method: Method,
    pub std: Option<Array1<f64>>,
    /// Per-variable chains, one row per latent variable.
    pub samples: Option<Array2<f64>>,
    pub q: Option<Vec<QNormal>>,
}

impl RegistryUpdate {
    pub fn point(values: Array1<f64>, method: Method, std: Option<Array1<f64>>) -> Self {
        Self {
            values,
            method,
            std,
            samples: None,
            q: None,
        }
    }
}

/// Ordered registry of a model's latent variables.
///
/// There is exactly one registry per model instance; variable indices are
/// assigned at [`LatentVariables::add`] time and stable thereafter.
#[derive(Clone, Debug, PartialEq)]
pub struct LatentVariables {
    model_name: String,
    z_list: Vec<LatentVariable>,
    estimation_method: Option<Method>,
}

impl LatentVariables {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            z_list: Vec::new(),
            estimation_method: None,
        }
    }

    pub fn add(&mut self, name: impl Into<String>, prior: Prior, start: f64) {
        let index = self.z_list.len();
        self.z_list
            .push(LatentVariable::new(name.into(), index, prior, start));
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn len(&self) -> usize {
        self.z_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z_list.is_empty()
    }

    pub fn z_list(&self) -> &[LatentVariable] {
        &self.z_list
    }

    pub fn get(&self, index: usize) -> Option<&LatentVariable> {
        self.z_list.get(index)
    }

    /// Method that produced the current values, if any fit has run.
    pub fn estimation_method(&self) -> Option<Method> {
        self.estimation_method
    }

    pub fn names(&self) -> Vec<String> {
        self.z_list.iter().map(|z| z.name.clone()).collect()
    }

    /// Declared starting values on the unconstrained scale.
    pub fn starting_values(&self) -> Array1<f64> {
        self.z_list.iter().map(|z| z.start).collect()
    }

    /// Current values, raw or pushed through each variable's link.
    pub fn values(&self, transformed: bool) -> Array1<f64> {
        self.z_list
            .iter()
            .map(|z| {
                if transformed {
                    z.value_transformed()
                } else {
                    z.value_raw()
                }
            })
            .collect()
    }

    /// Apply a complete estimator update in one step.
    ///
    /// Panics on a length mismatch between the update and the registry; an
    /// estimator producing the wrong number of values is a programming error,
    /// not a runtime condition.
    pub fn apply(&mut self, update: RegistryUpdate) {
        let n = self.z_list.len();
        assert_eq!(update.values.len(), n, "update length must match registry");
        if let Some(std) = &update.std {
            assert_eq!(std.len(), n, "standard error length must match registry");
        }
        if let Some(samples) = &update.samples {
            assert_eq!(samples.nrows(), n, "one chain row per latent variable");
        }
        if let Some(q) = &update.q {
            assert_eq!(q.len(), n, "one approximating distribution per variable");
        }
        for (k, z) in self.z_list.iter_mut().enumerate() {
            z.value = Some(update.values[k]);
            z.std = update.std.as_ref().map(|s| s[k]);
            z.sample = update.samples.as_ref().map(|m| m.row(k).to_owned());
            if let Some(q) = &update.q {
                z.q = q[k];
            }
        }
        self.estimation_method = Some(update.method);
    }

    /// Replace the prior of one or more latent variables.
    pub fn adjust_prior(&mut self, indices: &[usize], prior: Prior) -> Result<(), FitError> {
        let len = self.z_list.len();
        for &index in indices {
            if index >= len {
                return Err(FitError::InvalidIndex { index, len });
            }
        }
        for &index in indices {
            self.z_list[index].prior = prior.clone();
        }
        Ok(())
    }

    /// Registry snapshot stored in a fit result. An exact copy: ownership
    /// makes the historical copy-or-live-reference fallback unreachable.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}
