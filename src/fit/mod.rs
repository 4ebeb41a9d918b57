//! Fitting methods and the dispatch entry point.
//!
//! [`Fit::fit`] is the single public entry: it validates the requested method
//! against the model's declared supported set, routes to exactly one
//! estimator, applies the estimator's registry update atomically, and packages
//! a [`FitResult`]. Estimator internals live in the submodules.

pub mod bbvi;
pub mod laplace;
pub mod mcmc;
pub mod ols;
pub mod optimize;

use crate::error::FitError;
use crate::family::{Categorized, ModelFamily, categorize};
use crate::index::ObservationIndex;
use crate::latent::{LatentVariables, RegistryUpdate};
use crate::model::Model;
use crate::posterior;
use crate::prior::Prior;

use bbvi::{QNormal, VarOptimizer};
use ndarray::{Array1, Array2};
use optimize::{ObjectiveKind, PointOptimizer};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fitting method, carrying the wire names models declare in their supported
/// sets ("MLE", "PML", "OLS", "Laplace", "M-H", "BBVI").
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Method {
    #[serde(rename = "MLE")]
    Mle,
    #[serde(rename = "PML")]
    Pml,
    #[serde(rename = "OLS")]
    Ols,
    Laplace,
    #[serde(rename = "M-H")]
    MetropolisHastings,
    #[serde(rename = "BBVI")]
    Bbvi,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mle => "MLE",
            Self::Pml => "PML",
            Self::Ols => "OLS",
            Self::Laplace => "Laplace",
            Self::MetropolisHastings => "M-H",
            Self::Bbvi => "BBVI",
        };
        f.write_str(name)
    }
}

impl FromStr for Method {
    type Err = FitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mle" => Ok(Self::Mle),
            "pml" => Ok(Self::Pml),
            "ols" => Ok(Self::Ols),
            "laplace" => Ok(Self::Laplace),
            "m-h" => Ok(Self::MetropolisHastings),
            "bbvi" => Ok(Self::Bbvi),
            _ => Err(FitError::UnknownMethod(s.to_string())),
        }
    }
}

/// Options consumed by [`Fit::fit`]. Each field is read only by the method it
/// configures; the rest ignore it.
#[derive(Clone, Debug, PartialEq)]
pub struct FitOptions {
    /// Starting-value override on the unconstrained scale.
    pub start: Option<Array1<f64>>,
    /// Mini-batch size per BBVI iteration.
    pub batch_size: usize,
    /// BBVI iteration count.
    pub iterations: usize,
    /// BBVI step-size scheme.
    pub optimizer: VarOptimizer,
    /// Starting log-scale override for the BBVI approximating family.
    pub start_scale: Option<f64>,
    /// Proposal covariance override for Metropolis-Hastings.
    pub cov_matrix: Option<Array2<f64>>,
    /// Metropolis-Hastings simulation count.
    pub nsims: usize,
    /// MCMC sampler variant; only "M-H" is recognized.
    pub sampler: String,
    /// Point-optimizer settings shared by MLE/PML and the mode fits behind
    /// Laplace, M-H, and BBVI initialization.
    pub point: PointOptimizer,
    /// RNG seed for the sampling methods; fresh OS entropy when absent.
    pub seed: Option<u64>,
}

impl FitOptions {
    #[inline]
    pub fn default_batch_size() -> usize {
        12
    }

    #[inline]
    pub fn default_iterations() -> usize {
        1000
    }

    #[inline]
    pub fn default_nsims() -> usize {
        10000
    }

    #[inline]
    pub fn default_sampler() -> String {
        "M-H".to_string()
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            start: None,
            batch_size: Self::default_batch_size(),
            iterations: Self::default_iterations(),
            optimizer: VarOptimizer::default(),
            start_scale: None,
            cov_matrix: None,
            nsims: Self::default_nsims(),
            sampler: Self::default_sampler(),
            point: PointOptimizer::default(),
            seed: None,
        }
    }
}

/// Method-specific artifacts attached to a [`FitResult`]: one variant per
/// uniform result shape.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum MethodDetail {
    /// MLE/PML/OLS point estimate. `ihessian` is absent when the Hessian at
    /// the optimum could not be inverted; the fit itself still succeeded.
    Point { ihessian: Option<Array2<f64>> },
    /// Gaussian approximation around the posterior mode.
    Laplace { ihessian: Array2<f64> },
    /// Posterior sampling summaries, all on the natural scale.
    Mcmc {
        /// `nsims x z_no` chain of transformed samples.
        chain: Array2<f64>,
        mean: Array1<f64>,
        median: Array1<f64>,
        lower_95: Array1<f64>,
        upper_95: Array1<f64>,
    },
    /// Converged variational family; `ses` are the raw log-scales.
    Bbvi { ses: Array1<f64>, q: Vec<QNormal> },
}

/// Uniform outcome of one successful `fit` call. Immutable once built.
#[derive(Clone, Debug)]
pub struct FitResult {
    pub data_name: String,
    pub model_name: String,
    pub family: ModelFamily,
    /// Registry snapshot taken at convergence.
    pub latent_variables: LatentVariables,
    pub output: Categorized,
    pub method: Method,
    pub index: ObservationIndex,
    pub multivariate: bool,
    pub max_lag: usize,
    pub detail: MethodDetail,
}

/// Package a categorized output and method detail into a [`FitResult`],
/// snapshotting the registry as it stands after the estimator's update.
pub(crate) fn package<M: Model + ?Sized>(
    model: &M,
    method: Method,
    output: Categorized,
    detail: MethodDetail,
) -> FitResult {
    FitResult {
        data_name: model.data_name(),
        model_name: model.model_name(),
        family: model.family(),
        latent_variables: model.latent_variables().snapshot(),
        output,
        method,
        index: model.index().clone(),
        multivariate: model.multivariate(),
        max_lag: model.max_lag(),
        detail,
    }
}

/// Categorize a raw parameter vector through the model, before any registry
/// mutation so a shape failure cannot leave a partial write behind.
pub(crate) fn categorize_for<M: Model + ?Sized>(
    model: &M,
    z: &Array1<f64>,
) -> Result<Categorized, FitError> {
    categorize(model.family(), model.output(z), model.covariate_names())
}

/// Estimation entry points, blanket-implemented for every [`Model`].
pub trait Fit: Model {
    /// Fit the model's latent variables under `method` (the model's default
    /// method when `None`), returning a uniform result and updating the
    /// registry in one step on success. A rejected or failed estimator leaves
    /// the registry as it was, except that Laplace commits its inner mode fit
    /// before checking curvature.
    fn fit(&mut self, method: Option<Method>, options: &FitOptions) -> Result<FitResult, FitError> {
        let method = match method {
            None => self.default_method(),
            Some(m) => {
                let supported = self.supported_methods();
                if !supported.contains(&m) {
                    return Err(FitError::InvalidMethod {
                        requested: m,
                        supported,
                    });
                }
                m
            }
        };
        match method {
            Method::Mle => optimize::optimize_fit(self, ObjectiveKind::Likelihood, options),
            Method::Pml => optimize::optimize_fit(self, ObjectiveKind::Posterior, options),
            Method::Ols => ols::ols_fit(self),
            Method::Laplace => laplace::laplace_fit(self, options),
            Method::MetropolisHastings => mcmc::mcmc_fit(self, options),
            Method::Bbvi => bbvi::bbvi_fit(self, options),
        }
    }

    /// Negative log-posterior at an unconstrained parameter vector.
    fn neg_logposterior(&self, beta: &Array1<f64>) -> f64 {
        posterior::neg_logposterior(self, beta)
    }

    /// Negative log-posterior for models with a shared covariance-matrix
    /// prior.
    fn multivariate_neg_logposterior(&self, beta: &Array1<f64>) -> f64 {
        posterior::multivariate_neg_logposterior(self, beta)
    }

    /// Latent variables pushed through their links onto the natural scale.
    fn transform_z(&self) -> Array1<f64> {
        self.latent_variables().values(true)
    }

    /// Extend the observation index by `h` forecast steps.
    fn shift_dates(&self, h: usize) -> ObservationIndex {
        self.index().shift_dates(h, self.max_lag())
    }

    /// Replace the prior of the given latent variables.
    fn adjust_prior(&mut self, indices: &[usize], prior: Prior) -> Result<(), FitError> {
        self.latent_variables_mut().adjust_prior(indices, prior)
    }
}

impl<M: Model + ?Sized> Fit for M {}

/// Atomically apply an estimator's update record to the model's registry.
pub(crate) fn apply_update<M: Model + ?Sized>(model: &mut M, update: RegistryUpdate) {
    model.latent_variables_mut().apply(update);
}
