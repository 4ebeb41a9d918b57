use crate::family::{ModelFamily, ModelOutput};
use crate::fit::Method;
use crate::index::ObservationIndex;
use crate::latent::LatentVariables;

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

/// Linear design exposed by models that support the OLS closed form: a `T x k`
/// design matrix and a `T x m` response matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct OlsData {
    pub design: Array2<f64>,
    pub response: Array2<f64>,
}

/// Contract a concrete time-series model implements to be estimable.
///
/// The engine is agnostic to how the model computes its likelihood or its
/// decomposed output; everything it needs flows through this trait and the
/// latent-variable registry the model owns.
pub trait Model {
    /// Structural family, deciding which outputs the model exposes.
    fn family(&self) -> ModelFamily;

    fn model_name(&self) -> String;

    fn data_name(&self) -> String;

    fn default_method(&self) -> Method;

    fn supported_methods(&self) -> Vec<Method>;

    /// Number of leading observations consumed by lags.
    fn max_lag(&self) -> usize {
        0
    }

    fn multivariate(&self) -> bool {
        false
    }

    fn index(&self) -> &ObservationIndex;

    fn latent_variables(&self) -> &LatentVariables;

    fn latent_variables_mut(&mut self) -> &mut LatentVariables;

    /// Negative log-likelihood at an unconstrained parameter vector. Must be
    /// deterministic for a fixed input; it is invoked many times per fit.
    fn neg_loglik(&self, z: &Array1<f64>) -> f64;

    /// Family-shaped decomposition of a raw parameter vector.
    fn output(&self, z: &Array1<f64>) -> ModelOutput;

    /// Covariate names, for regression families.
    fn covariate_names(&self) -> Option<Vec<String>> {
        None
    }

    /// Linear design for the OLS closed form, when the model has one.
    fn ols_data(&self) -> Option<OlsData> {
        None
    }

    /// Residual covariance implied by a raw parameter vector; consumed once
    /// by a shared covariance-matrix prior in the multivariate posterior.
    fn covariance_from(&self, _z: &Array1<f64>) -> Option<DMatrix<f64>> {
        None
    }

    /// Number of latent variables.
    fn z_no(&self) -> usize {
        self.latent_variables().len()
    }
}
