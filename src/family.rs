use crate::error::FitError;

use ndarray::{Array1, Array2, s, stack};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Structural family of a model, deciding which observable outputs it exposes.
///
/// The capability table below is the single source of truth for which of the
/// optional [`Categorized`] fields a family populates; adding a family means
/// adding a variant here and a matching [`ModelOutput`] shape, not editing a
/// central conditional.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ModelFamily {
    /// Score-driven and GARCH-style volatility models: signal plus a score
    /// sequence.
    ScoreDriven,
    /// Score-driven local level/trend models: adds a two-row state path.
    LocalTrend,
    /// Score-driven regressions: adds a coefficient state path and covariate
    /// names.
    ScoreDrivenRegression,
    /// Gaussian state-space models: smoothed state path and its variance.
    StateSpace,
    /// Gaussian-process models: signal and data only, already denormalized by
    /// the model.
    GaussianProcess,
    /// Anything else: minimal signal/data decomposition.
    Other,
}

impl ModelFamily {
    pub fn has_scores(&self) -> bool {
        matches!(
            self,
            Self::ScoreDriven | Self::LocalTrend | Self::ScoreDrivenRegression
        )
    }

    pub fn has_states(&self) -> bool {
        matches!(
            self,
            Self::LocalTrend | Self::ScoreDrivenRegression | Self::StateSpace
        )
    }

    pub fn has_states_var(&self) -> bool {
        matches!(self, Self::StateSpace)
    }

    pub fn has_covariate_names(&self) -> bool {
        matches!(self, Self::ScoreDrivenRegression)
    }

    /// Whether a quick posterior-mode optimization is a trustworthy
    /// initializer for this family. Gaussian-process objectives are too
    /// unreliable near the declared starting values, so samplers and the
    /// variational engine start from those values directly instead.
    pub fn stable_mode_init(&self) -> bool {
        !matches!(self, Self::GaussianProcess)
    }
}

/// Family-shaped decomposition of a raw parameter vector, as produced by the
/// model itself. One variant per family shape; the engine never inspects
/// model internals beyond this.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ModelOutput {
    ScoreDriven {
        signal: Array1<f64>,
        data: Array1<f64>,
        scores: Array1<f64>,
    },
    LocalTrend {
        signal: Array1<f64>,
        trend: Array1<f64>,
        data: Array1<f64>,
        scores: Array1<f64>,
    },
    ScoreDrivenRegression {
        signal: Array1<f64>,
        data: Array1<f64>,
        scores: Array1<f64>,
        states: Array2<f64>,
    },
    StateSpace {
        data: Array1<f64>,
        states: Array2<f64>,
        states_var: Array2<f64>,
    },
    GaussianProcess {
        signal: Array1<f64>,
        data: Array1<f64>,
    },
    Plain {
        signal: Array1<f64>,
        data: Array1<f64>,
    },
}

impl ModelOutput {
    fn family(&self) -> ModelFamily {
        match self {
            Self::ScoreDriven { .. } => ModelFamily::ScoreDriven,
            Self::LocalTrend { .. } => ModelFamily::LocalTrend,
            Self::ScoreDrivenRegression { .. } => ModelFamily::ScoreDrivenRegression,
            Self::StateSpace { .. } => ModelFamily::StateSpace,
            Self::GaussianProcess { .. } => ModelFamily::GaussianProcess,
            Self::Plain { .. } => ModelFamily::Other,
        }
    }
}

/// Uniform categorized output carried by every fit result: the signal and the
/// observed data are always present, the rest only for families that declare
/// them.
#[derive(Clone, Debug, PartialEq)]
pub struct Categorized {
    pub signal: Array1<f64>,
    pub data: Array1<f64>,
    pub scores: Option<Array1<f64>>,
    pub states: Option<Array2<f64>>,
    pub states_var: Option<Array2<f64>>,
    pub x_names: Option<Vec<String>>,
}

/// Flatten a family-shaped [`ModelOutput`] into the uniform [`Categorized`]
/// record, checking the variant against the declared family.
pub fn categorize(
    family: ModelFamily,
    output: ModelOutput,
    x_names: Option<Vec<String>>,
) -> Result<Categorized, FitError> {
    if output.family() != family {
        return Err(FitError::OutputShapeMismatch { family });
    }
    let categorized = match output {
        ModelOutput::ScoreDriven {
            signal,
            data,
            scores,
        } => Categorized {
            signal,
            data,
            scores: Some(scores),
            states: None,
            states_var: None,
            x_names: None,
        },
        ModelOutput::LocalTrend {
            signal,
            trend,
            data,
            scores,
        } => {
            let states = stack(ndarray::Axis(0), &[signal.view(), trend.view()])
                .map_err(|_| FitError::OutputShapeMismatch { family })?;
            Categorized {
                signal,
                data,
                scores: Some(scores),
                states: Some(states),
                states_var: None,
                x_names: None,
            }
        }
        ModelOutput::ScoreDrivenRegression {
            signal,
            data,
            scores,
            states,
        } => Categorized {
            signal,
            data,
            scores: Some(scores),
            states: Some(states),
            states_var: None,
            x_names,
        },
        ModelOutput::StateSpace {
            data,
            states,
            states_var,
        } => {
            // The reported signal is the first state path, dropping the
            // one-step-ahead value at the end.
            let first = states.row(0);
            let signal = first.slice(s![..first.len().saturating_sub(1)]).to_owned();
            Categorized {
                signal,
                data,
                scores: None,
                states: Some(states),
                states_var: Some(states_var),
                x_names: None,
            }
        }
        ModelOutput::GaussianProcess { signal, data } | ModelOutput::Plain { signal, data } => {
            Categorized {
                signal,
                data,
                scores: None,
                states: None,
                states_var: None,
                x_names: None,
            }
        }
    };
    Ok(categorized)
}
