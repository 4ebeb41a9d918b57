//! Closed-form ordinary least squares for models exposing a linear design.

use crate::error::FitError;
use crate::fit::{FitResult, Method, MethodDetail, RegistryUpdate, apply_update, package};
use crate::model::Model;

use nalgebra::DMatrix;
use ndarray::Array1;

/// Estimate by the normal equations.
///
/// Coefficients are `B = (X^T X)^{-1} X^T Y`, flattened response-major (all
/// coefficients of the first response variable, then the second, and so on).
/// The residual covariance `Sigma = E^T E / (T - k)` fills the remaining
/// latent variables with its lower triangle, each entry pulled back through
/// the covariance variables' inverse link. The estimator covariance is the
/// Kronecker product `Sigma (x) (X^T X)^{-1}`; covariance-entry variables get
/// a unit standard-error sentinel since the closed form carries no curvature
/// for them.
pub(crate) fn ols_fit<M: Model + ?Sized>(model: &mut M) -> Result<FitResult, FitError> {
    let data = model.ols_data().ok_or(FitError::OlsUnsupported)?;
    let t = data.design.nrows();
    let k = data.design.ncols();
    let m = data.response.ncols();
    if data.response.nrows() != t {
        return Err(FitError::SingularDesign);
    }

    let x = DMatrix::from_fn(t, k, |i, j| data.design[[i, j]]);
    let y = DMatrix::from_fn(t, m, |i, j| data.response[[i, j]]);

    let xtx = x.transpose() * &x;
    let xtx_inv = xtx.try_inverse().ok_or(FitError::SingularDesign)?;
    if t <= k {
        return Err(FitError::SingularDesign);
    }

    let b = &xtx_inv * x.transpose() * &y;
    let residuals = &y - &x * &b;
    let sigma = residuals.transpose() * &residuals / (t - k) as f64;

    // k*m coefficients followed by m(m+1)/2 covariance entries.
    let z_no = model.z_no();
    let n_cov = m * (m + 1) / 2;
    if z_no != k * m + n_cov {
        return Err(FitError::RegistryLengthMismatch {
            expected: k * m + n_cov,
            actual: z_no,
        });
    }

    let mut values = Vec::with_capacity(z_no);
    for col in 0..m {
        for row in 0..k {
            values.push(b[(row, col)]);
        }
    }
    // Covariance entries enter the registry on the unconstrained scale; the
    // last latent variable's prior carries the link all of them share.
    let cov_prior = model
        .latent_variables()
        .z_list()
        .last()
        .map(|z| z.prior().clone())
        .ok_or(FitError::OlsUnsupported)?;
    for i in 0..m {
        for j in 0..=i {
            values.push(cov_prior.itransform(sigma[(i, j)]));
        }
    }
    let values = Array1::from_vec(values);

    let kron = sigma.kronecker(&xtx_inv);
    let mut ses = Vec::with_capacity(z_no);
    for i in 0..k * m {
        ses.push(kron[(i, i)].abs().sqrt());
    }
    ses.extend(std::iter::repeat_n(1.0, n_cov));
    let ses = Array1::from_vec(ses);

    let ihessian = ndarray::Array2::from_shape_fn((k * m, k * m), |(i, j)| kron[(i, j)]);

    let output = super::categorize_for(model, &values)?;
    apply_update(
        model,
        RegistryUpdate::point(values, Method::Ols, Some(ses)),
    );
    Ok(package(
        model,
        Method::Ols,
        output,
        MethodDetail::Point {
            ihessian: Some(ihessian),
        },
    ))
}
