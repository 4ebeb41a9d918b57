//! Toy models shared across the unit tests.

use crate::family::{ModelFamily, ModelOutput};
use crate::fit::Method;
use crate::index::ObservationIndex;
use crate::latent::LatentVariables;
use crate::link::Link;
use crate::model::{Model, OlsData};
use crate::prior::Prior;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Independent draws from a normal distribution with unknown mean and scale.
/// Two latent variables: the mean (identity link) and the log scale (exp
/// link).
pub struct NormalModel {
    data: Array1<f64>,
    index: ObservationIndex,
    latent_variables: LatentVariables,
}

impl NormalModel {
    /// Fixed dataset of 200 draws from N(1, 0.5^2).
    pub fn standard() -> Self {
        let mut rng = StdRng::seed_from_u64(17);
        let data =
            Array1::from_shape_fn(200, |_| 1.0 + 0.5 * rng.sample::<f64, _>(StandardNormal));
        let mut latent_variables = LatentVariables::new("Normal");
        latent_variables.add("mu", Prior::normal(0.0, 3.0, Link::identity()), 0.0);
        latent_variables.add("ln sigma", Prior::uniform(Link::exp()), 0.0);
        Self {
            index: ObservationIndex::sequential(data.len()),
            data,
            latent_variables,
        }
    }

    pub fn sample_mean(&self) -> f64 {
        self.data.sum() / self.data.len() as f64
    }

    /// Maximum-likelihood standard deviation, without the small-sample
    /// correction.
    pub fn sample_std(&self) -> f64 {
        let mean = self.sample_mean();
        (self.data.mapv(|v| (v - mean) * (v - mean)).sum() / self.data.len() as f64).sqrt()
    }
}

impl Model for NormalModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Other
    }

    fn model_name(&self) -> String {
        "Normal".to_string()
    }

    fn data_name(&self) -> String {
        "series".to_string()
    }

    fn default_method(&self) -> Method {
        Method::Mle
    }

    fn supported_methods(&self) -> Vec<Method> {
        vec![
            Method::Mle,
            Method::Pml,
            Method::Laplace,
            Method::MetropolisHastings,
            Method::Bbvi,
        ]
    }

    fn index(&self) -> &ObservationIndex {
        &self.index
    }

    fn latent_variables(&self) -> &LatentVariables {
        &self.latent_variables
    }

    fn latent_variables_mut(&mut self) -> &mut LatentVariables {
        &mut self.latent_variables
    }

    fn neg_loglik(&self, z: &Array1<f64>) -> f64 {
        let mu = z[0];
        let sigma = z[1].exp();
        let t = self.data.len() as f64;
        let sum_sq = self.data.mapv(|v| (v - mu) * (v - mu)).sum();
        t * (sigma * (2.0 * std::f64::consts::PI).sqrt()).ln()
            + sum_sq / (2.0 * sigma * sigma)
    }

    fn output(&self, z: &Array1<f64>) -> ModelOutput {
        ModelOutput::Plain {
            signal: Array1::from_elem(self.data.len(), z[0]),
            data: self.data.clone(),
        }
    }
}

/// Model with a constant likelihood and a flat prior: zero curvature
/// everywhere, so standard errors and the Laplace approximation degrade.
pub struct FlatModel {
    data: Array1<f64>,
    index: ObservationIndex,
    latent_variables: LatentVariables,
}

impl FlatModel {
    pub fn new() -> Self {
        let data = Array1::zeros(5);
        let mut latent_variables = LatentVariables::new("Flat");
        latent_variables.add("theta", Prior::uniform(Link::identity()), 0.0);
        Self {
            index: ObservationIndex::sequential(data.len()),
            data,
            latent_variables,
        }
    }
}

impl Model for FlatModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Other
    }

    fn model_name(&self) -> String {
        "Flat".to_string()
    }

    fn data_name(&self) -> String {
        "series".to_string()
    }

    fn default_method(&self) -> Method {
        Method::Mle
    }

    fn supported_methods(&self) -> Vec<Method> {
        vec![Method::Mle, Method::Pml, Method::Laplace]
    }

    fn index(&self) -> &ObservationIndex {
        &self.index
    }

    fn latent_variables(&self) -> &LatentVariables {
        &self.latent_variables
    }

    fn latent_variables_mut(&mut self) -> &mut LatentVariables {
        &mut self.latent_variables
    }

    fn neg_loglik(&self, _z: &Array1<f64>) -> f64 {
        0.0
    }

    fn output(&self, z: &Array1<f64>) -> ModelOutput {
        ModelOutput::Plain {
            signal: Array1::from_elem(self.data.len(), z[0]),
            data: self.data.clone(),
        }
    }
}

/// Two-equation linear system estimable by the OLS closed form. Seven latent
/// variables: four coefficients followed by the three lower-triangle entries
/// of the residual covariance.
pub struct VarModel {
    design: Array2<f64>,
    response: Array2<f64>,
    index: ObservationIndex,
    latent_variables: LatentVariables,
}

impl VarModel {
    /// Exact linear data: `y1 = 1 + 2x`, `y2 = -3 + 0.5x`, no noise.
    pub fn noiseless() -> Self {
        Self::build(0.0, 0.0, Link::identity())
    }

    /// Same system with seeded normal noise.
    pub fn noisy() -> Self {
        Self::build(0.7, 0.0, Link::identity())
    }

    /// Noisy system with cross-equation residual correlation `rho` and an
    /// exponential link on the covariance block, so the stored covariance
    /// entries live on the log scale.
    pub fn correlated(rho: f64) -> Self {
        Self::build(0.7, rho, Link::exp())
    }

    fn build(noise: f64, rho: f64, cov_link: Link) -> Self {
        let t = 30;
        let mut rng = StdRng::seed_from_u64(5);
        let design = Array2::from_shape_fn((t, 2), |(i, j)| if j == 0 { 1.0 } else { i as f64 });
        let mut response = Array2::zeros((t, 2));
        for i in 0..t {
            let x = i as f64;
            let e1 = noise * rng.sample::<f64, _>(StandardNormal);
            let e2 = rho * e1 + noise * rng.sample::<f64, _>(StandardNormal);
            response[[i, 0]] = 1.0 + 2.0 * x + e1;
            response[[i, 1]] = -3.0 + 0.5 * x + e2;
        }
        let mut latent_variables = LatentVariables::new("VAR");
        for name in ["y1 constant", "y1 beta", "y2 constant", "y2 beta"] {
            latent_variables.add(name, Prior::normal(0.0, 3.0, Link::identity()), 0.0);
        }
        for name in ["cov(1,1)", "cov(2,1)", "cov(2,2)"] {
            latent_variables.add(name, Prior::normal(0.0, 3.0, cov_link), 0.0);
        }
        Self {
            index: ObservationIndex::sequential(t),
            design,
            response,
            latent_variables,
        }
    }
}

impl Model for VarModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::Other
    }

    fn model_name(&self) -> String {
        "VAR".to_string()
    }

    fn data_name(&self) -> String {
        "system".to_string()
    }

    fn default_method(&self) -> Method {
        Method::Ols
    }

    fn supported_methods(&self) -> Vec<Method> {
        vec![Method::Ols]
    }

    fn index(&self) -> &ObservationIndex {
        &self.index
    }

    fn latent_variables(&self) -> &LatentVariables {
        &self.latent_variables
    }

    fn latent_variables_mut(&mut self) -> &mut LatentVariables {
        &mut self.latent_variables
    }

    fn neg_loglik(&self, _z: &Array1<f64>) -> f64 {
        f64::INFINITY
    }

    fn output(&self, z: &Array1<f64>) -> ModelOutput {
        let fitted = Array1::from_shape_fn(self.design.nrows(), |i| {
            z[0] * self.design[[i, 0]] + z[1] * self.design[[i, 1]]
        });
        ModelOutput::Plain {
            signal: fitted,
            data: self.response.column(0).to_owned(),
        }
    }

    fn ols_data(&self) -> Option<OlsData> {
        Some(OlsData {
            design: self.design.clone(),
            response: self.response.clone(),
        })
    }
}

/// Quadratic-bowl model that counts likelihood evaluations. Declared as a
/// Gaussian-process family so the samplers skip the mode-fit initialization
/// and every evaluation comes from the estimator loop itself.
pub struct CountingModel {
    data: Array1<f64>,
    index: ObservationIndex,
    latent_variables: LatentVariables,
    calls: std::cell::Cell<usize>,
}

impl CountingModel {
    pub fn new() -> Self {
        let data = Array1::zeros(4);
        let mut latent_variables = LatentVariables::new("Counting");
        latent_variables.add("theta", Prior::uniform(Link::identity()), 0.0);
        Self {
            index: ObservationIndex::sequential(data.len()),
            data,
            latent_variables,
            calls: std::cell::Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Model for CountingModel {
    fn family(&self) -> ModelFamily {
        ModelFamily::GaussianProcess
    }

    fn model_name(&self) -> String {
        "Counting".to_string()
    }

    fn data_name(&self) -> String {
        "series".to_string()
    }

    fn default_method(&self) -> Method {
        Method::Bbvi
    }

    fn supported_methods(&self) -> Vec<Method> {
        vec![Method::MetropolisHastings, Method::Bbvi]
    }

    fn index(&self) -> &ObservationIndex {
        &self.index
    }

    fn latent_variables(&self) -> &LatentVariables {
        &self.latent_variables
    }

    fn latent_variables_mut(&mut self) -> &mut LatentVariables {
        &mut self.latent_variables
    }

    fn neg_loglik(&self, z: &Array1<f64>) -> f64 {
        self.calls.set(self.calls.get() + 1);
        z[0] * z[0]
    }

    fn output(&self, z: &Array1<f64>) -> ModelOutput {
        ModelOutput::GaussianProcess {
            signal: Array1::from_elem(self.data.len(), z[0]),
            data: self.data.clone(),
        }
    }
}
