//! Objective adapters composing a model's likelihood with its priors.

use crate::model::Model;
use crate::prior::PriorDensity;

use ndarray::Array1;

/// Negative log-posterior: the model's negative log-likelihood plus the sum
/// of negative log-prior densities over all latent variables, evaluated at an
/// unconstrained parameter vector.
pub fn neg_logposterior<M: Model + ?Sized>(model: &M, beta: &Array1<f64>) -> f64 {
    let mut post = model.neg_loglik(beta);
    for z in model.latent_variables().z_list() {
        post += -z.prior().ln_pdf(beta[z.index()]);
    }
    post
}

/// Negative log-posterior for models carrying a single shared prior over
/// their residual covariance matrix: scalar priors contribute per variable as
/// usual, and the first covariance-flagged prior contributes once, evaluated
/// at the covariance implied by the whole parameter vector.
pub fn multivariate_neg_logposterior<M: Model + ?Sized>(model: &M, beta: &Array1<f64>) -> f64 {
    let mut post = model.neg_loglik(beta);
    for z in model.latent_variables().z_list() {
        if z.prior().covariance_prior() {
            if let Some(sigma) = model.covariance_from(beta) {
                post += -z.prior().ln_pdf_matrix(&sigma);
            }
            break;
        }
        post += -z.prior().ln_pdf(beta[z.index()]);
    }
    post
}
