#![doc = include_str!("../README.md")]

#[cfg(test)]
mod tests;

mod error;
pub use error::FitError;

mod family;
pub use family::{Categorized, ModelFamily, ModelOutput, categorize};

mod fit;
pub use fit::bbvi::{QNormal, VarOptimizer};
pub use fit::optimize::PointOptimizer;
pub use fit::{Fit, FitOptions, FitResult, Method, MethodDetail};

mod index;
pub use index::ObservationIndex;

mod latent;
pub use latent::{LatentVariable, LatentVariables, RegistryUpdate};

mod link;
pub use link::{Link, LinkFunction};

mod model;
pub use model::{Model, OlsData};

mod posterior;
pub use posterior::{multivariate_neg_logposterior, neg_logposterior};

mod prior;
pub use prior::{Prior, PriorDensity};

pub use ndarray;
