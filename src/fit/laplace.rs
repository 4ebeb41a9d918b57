//! Laplace approximation: a Gaussian centered at the posterior mode with the
//! inverse Hessian as covariance.

use crate::error::FitError;
use crate::fit::{FitOptions, FitResult, Method, MethodDetail, package};
use crate::fit::optimize::{self, ObjectiveKind};
use crate::model::Model;

/// Run a PML point fit, then require curvature at the mode. The inner fit's
/// registry update stands either way; only the packaged result is demoted to
/// an error when the Hessian could not be inverted.
pub(crate) fn laplace_fit<M: Model + ?Sized>(
    model: &mut M,
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    let inner = optimize::optimize_fit(model, ObjectiveKind::Posterior, options)?;
    let ihessian = match inner.detail {
        MethodDetail::Point {
            ihessian: Some(ihessian),
        } => ihessian,
        _ => return Err(FitError::MissingHessian),
    };
    Ok(package(
        model,
        Method::Laplace,
        inner.output,
        MethodDetail::Laplace { ihessian },
    ))
}
