use crate::family::ModelFamily;
use crate::fit::Method;

use itertools::Itertools;

/// Error returned from [crate::Fit::fit] and the registry mutators.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FitError {
    #[error(
        "method {requested} is not supported by this model (supported: {})",
        .supported.iter().map(|m| m.to_string()).join(", ")
    )]
    InvalidMethod {
        requested: Method,
        supported: Vec<Method>,
    },

    #[error("unrecognized MCMC sampler: {0}")]
    UnsupportedSampler(String),

    #[error("unknown fitting method: {0}")]
    UnknownMethod(String),

    #[error("no curvature information - Laplace approximation cannot be performed")]
    MissingHessian,

    #[error("design matrix is singular - the OLS closed form cannot be solved")]
    SingularDesign,

    #[error("model does not expose a linear design for OLS")]
    OlsUnsupported,

    #[error("latent variable index {index} out of range for registry of length {len}")]
    InvalidIndex { index: usize, len: usize },

    #[error("model output shape does not match its declared family {family:?}")]
    OutputShapeMismatch { family: ModelFamily },

    #[error("registry holds {actual} latent variables, the estimator expects {expected}")]
    RegistryLengthMismatch { expected: usize, actual: usize },

    #[error("invalid fit option: {0}")]
    InvalidOption(&'static str),
}
