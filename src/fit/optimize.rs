//! Derivative-free point estimation (MLE and PML) on top of COBYLA, plus the
//! finite-difference curvature shared with the Laplace and M-H methods.

use crate::error::FitError;
use crate::fit::{FitOptions, Method, MethodDetail, RegistryUpdate, apply_update, package};
use crate::model::Model;
use crate::posterior;

use cobyla::{Func, RhoBeg, StopTols, minimize};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use ordered_float::NotNan;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Which objective a point fit minimizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectiveKind {
    /// Negative log-likelihood only.
    Likelihood,
    /// Negative log-likelihood plus negative log-priors.
    Posterior,
}

/// Evaluate the requested objective, routing the posterior through the
/// covariance-aware variant for multivariate models.
pub(crate) fn objective_value<M: Model + ?Sized>(
    model: &M,
    kind: ObjectiveKind,
    beta: &Array1<f64>,
) -> f64 {
    match kind {
        ObjectiveKind::Likelihood => model.neg_loglik(beta),
        ObjectiveKind::Posterior => {
            if model.multivariate() {
                posterior::multivariate_neg_logposterior(model, beta)
            } else {
                posterior::neg_logposterior(model, beta)
            }
        }
    }
}

/// COBYLA settings for the inner point optimization.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct PointOptimizer {
    pub maxeval: u32,
    pub rhobeg: NotNan<f64>,
    pub ftol_rel: NotNan<f64>,
}

impl PointOptimizer {
    /// # Arguments
    /// - `maxeval`: maximum number of objective evaluations
    /// - `rhobeg`: initial change to parameters
    /// - `ftol_rel`: relative tolerance on objective value for convergence
    pub fn new(maxeval: u32, rhobeg: f64, ftol_rel: f64) -> Self {
        assert!(maxeval > 0, "maxeval must be positive");
        assert!(rhobeg > 0.0, "rhobeg must be positive");
        assert!(rhobeg.is_finite(), "rhobeg must be finite");
        assert!(ftol_rel >= 0.0, "ftol_rel must be non-negative");
        assert!(ftol_rel.is_finite(), "ftol_rel must be finite");
        Self {
            maxeval,
            rhobeg: NotNan::new(rhobeg).expect("rhobeg must be finite and not NaN"),
            ftol_rel: NotNan::new(ftol_rel).expect("ftol_rel must be finite and not NaN"),
        }
    }

    #[inline]
    pub fn default_maxeval() -> u32 {
        5000
    }

    #[inline]
    pub fn default_rhobeg() -> f64 {
        0.5
    }

    #[inline]
    pub fn default_ftol_rel() -> f64 {
        1e-8
    }
}

impl Default for PointOptimizer {
    fn default() -> Self {
        Self::new(
            Self::default_maxeval(),
            Self::default_rhobeg(),
            Self::default_ftol_rel(),
        )
    }
}

/// Minimize an unconstrained scalar objective from `x0`.
pub(crate) fn minimize_scalar<F>(
    settings: &PointOptimizer,
    objective: F,
    x0: &Array1<f64>,
) -> Array1<f64>
where
    F: Fn(&Array1<f64>) -> f64,
{
    let cobyla_objective = move |x: &[f64], _user_data: &mut ()| -> f64 {
        let beta = Array1::from_iter(x.iter().copied());
        let value = objective(&beta);
        // COBYLA models the objective by linear interpolation and stalls on
        // non-finite values; cap them instead.
        if value.is_finite() { value } else { f64::MAX }
    };

    let bounds: Vec<(f64, f64)> = x0
        .iter()
        .map(|_| (f64::NEG_INFINITY, f64::INFINITY))
        .collect();
    let constraints: Vec<&dyn Func<()>> = vec![];
    let stop_tol = StopTols {
        ftol_rel: settings.ftol_rel.into(),
        ..StopTols::default()
    };

    let result = minimize(
        cobyla_objective,
        x0.as_slice().expect("x0 is contiguous"),
        &bounds,
        &constraints,
        (),
        settings.maxeval as usize,
        RhoBeg::All(settings.rhobeg.into()),
        Some(stop_tol),
    );

    // Even a non-success status carries the best point found; the caller
    // decides quality from the curvature at that point.
    match result {
        Ok((_, x, _)) | Err((_, x, _)) => Array1::from_vec(x),
    }
}

/// Central-difference Hessian of `f` at `x`.
pub(crate) fn numeric_hessian<F>(f: F, x: &Array1<f64>) -> Array2<f64>
where
    F: Fn(&Array1<f64>) -> f64,
{
    let n = x.len();
    let step: Vec<f64> = x
        .iter()
        .map(|&xi| f64::EPSILON.powf(0.25) * (1.0 + xi.abs()))
        .collect();
    let mut hessian = Array2::zeros((n, n));
    let f0 = f(x);
    for i in 0..n {
        let hi = step[i];
        let mut xp = x.clone();
        let mut xm = x.clone();
        xp[i] += hi;
        xm[i] -= hi;
        hessian[[i, i]] = (f(&xp) - 2.0 * f0 + f(&xm)) / (hi * hi);
        for j in (i + 1)..n {
            let hj = step[j];
            let mut xpp = x.clone();
            let mut xpm = x.clone();
            let mut xmp = x.clone();
            let mut xmm = x.clone();
            xpp[i] += hi;
            xpp[j] += hj;
            xpm[i] += hi;
            xpm[j] -= hj;
            xmp[i] -= hi;
            xmp[j] += hj;
            xmm[i] -= hi;
            xmm[j] -= hj;
            let value = (f(&xpp) - f(&xpm) - f(&xmp) + f(&xmm)) / (4.0 * hi * hj);
            hessian[[i, j]] = value;
            hessian[[j, i]] = value;
        }
    }
    hessian
}

/// Invert a Hessian; `None` when it is singular or non-finite.
pub(crate) fn invert_hessian(hessian: &Array2<f64>) -> Option<Array2<f64>> {
    if hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let n = hessian.nrows();
    let matrix = DMatrix::from_fn(n, n, |i, j| hessian[[i, j]]);
    let inverse = matrix.try_inverse()?;
    if inverse.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Array2::from_shape_fn((n, n), |(i, j)| inverse[(i, j)]))
}

/// Standard errors from an inverse Hessian diagonal.
pub(crate) fn standard_errors(ihessian: &Array2<f64>) -> Array1<f64> {
    ihessian.diag().mapv(|v| v.abs().sqrt())
}

/// Shared point fit behind the MLE and PML methods. Standard errors degrade
/// to absent when the Hessian at the optimum cannot be inverted; the point
/// estimate itself is still committed.
pub(crate) fn optimize_fit<M: Model + ?Sized>(
    model: &mut M,
    kind: ObjectiveKind,
    options: &FitOptions,
) -> Result<super::FitResult, FitError> {
    let start = options
        .start
        .clone()
        .unwrap_or_else(|| model.latent_variables().starting_values());

    let phi = minimize_scalar(&options.point, |beta| objective_value(model, kind, beta), &start);

    let hessian = numeric_hessian(|beta| objective_value(model, kind, beta), &phi);
    let ihessian = invert_hessian(&hessian);
    let ses = ihessian.as_ref().map(standard_errors);

    let output = super::categorize_for(model, &phi)?;
    let method = match kind {
        ObjectiveKind::Likelihood => Method::Mle,
        ObjectiveKind::Posterior => Method::Pml,
    };
    apply_update(model, RegistryUpdate::point(phi, method, ses));
    Ok(package(
        model,
        method,
        output,
        MethodDetail::Point { ihessian },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn minimizes_a_shifted_quadratic() {
        let settings = PointOptimizer::default();
        let x = minimize_scalar(
            &settings,
            |beta| (beta[0] - 2.0).powi(2) + (beta[1] + 1.0).powi(2),
            &array![0.0, 0.0],
        );
        assert_abs_diff_eq!(x[0], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(x[1], -1.0, epsilon = 1e-4);
    }

    #[test]
    fn hessian_of_quadratic_form() {
        // f(x) = x0^2 + 3 x0 x1 + 5 x1^2 has constant Hessian [[2, 3], [3, 10]].
        let f = |beta: &Array1<f64>| {
            beta[0] * beta[0] + 3.0 * beta[0] * beta[1] + 5.0 * beta[1] * beta[1]
        };
        let h = numeric_hessian(f, &array![0.7, -0.3]);
        assert_abs_diff_eq!(h[[0, 0]], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(h[[0, 1]], 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(h[[1, 0]], 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(h[[1, 1]], 10.0, epsilon = 1e-4);
    }

    #[test]
    fn singular_hessian_yields_none() {
        let singular = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(invert_hessian(&singular).is_none());
        let nan = array![[f64::NAN, 0.0], [0.0, 1.0]];
        assert!(invert_hessian(&nan).is_none());
    }

    #[test]
    fn standard_errors_use_absolute_diagonal() {
        let ihessian = array![[4.0, 0.5], [0.5, -9.0]];
        let ses = standard_errors(&ihessian);
        assert_abs_diff_eq!(ses[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ses[1], 3.0, epsilon = 1e-12);
    }
}
