//! Black-box variational inference with a mean-field normal family and
//! score-function ELBO gradients.

use crate::error::FitError;
use crate::fit::optimize::{self, ObjectiveKind, objective_value};
use crate::fit::{
    FitOptions, FitResult, Method, MethodDetail, RegistryUpdate, apply_update, package,
};
use crate::model::Model;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// One-dimensional normal approximating distribution, parameterized by its
/// mean and log standard deviation so the scale stays positive under
/// unconstrained gradient steps.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QNormal {
    pub loc: f64,
    /// Log standard deviation.
    pub scale: f64,
}

impl QNormal {
    pub fn new(loc: f64, scale: f64) -> Self {
        Self { loc, scale }
    }

    #[inline]
    pub fn default_scale() -> f64 {
        -3.0
    }

    pub fn sigma(&self) -> f64 {
        self.scale.exp()
    }

    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        self.loc + self.sigma() * rng.sample::<f64, _>(StandardNormal)
    }

    pub fn ln_pdf(&self, x: f64) -> f64 {
        let sigma = self.sigma();
        let standardized = (x - self.loc) / sigma;
        -0.5 * standardized * standardized - sigma.ln() - 0.5 * (2.0 * PI).ln()
    }

    /// Score of the log-density with respect to the mean.
    pub fn score_loc(&self, x: f64) -> f64 {
        let sigma = self.sigma();
        (x - self.loc) / (sigma * sigma)
    }

    /// Score of the log-density with respect to the log standard deviation.
    pub fn score_scale(&self, x: f64) -> f64 {
        let standardized = (x - self.loc) / self.sigma();
        standardized * standardized - 1.0
    }
}

impl Default for QNormal {
    fn default() -> Self {
        Self::new(0.0, Self::default_scale())
    }
}

/// Stochastic-gradient step-size scheme for the variational parameters,
/// carrying the wire names callers configure ("RMSProp", "ADAM").
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum VarOptimizer {
    #[default]
    #[serde(rename = "RMSProp")]
    RmsProp,
    #[serde(rename = "ADAM")]
    Adam,
}

const LEARNING_RATE: f64 = 0.001;
const RMSPROP_DECAY: f64 = 0.99;
const ADAM_BETA_1: f64 = 0.9;
const ADAM_BETA_2: f64 = 0.999;
const STEP_EPS: f64 = 1e-8;

/// Per-parameter accumulator state for one scheme.
enum StepState {
    RmsProp {
        sq: Array1<f64>,
    },
    Adam {
        first: Array1<f64>,
        second: Array1<f64>,
        t: u64,
    },
}

impl StepState {
    fn new(scheme: VarOptimizer, len: usize) -> Self {
        match scheme {
            VarOptimizer::RmsProp => Self::RmsProp {
                sq: Array1::zeros(len),
            },
            VarOptimizer::Adam => Self::Adam {
                first: Array1::zeros(len),
                second: Array1::zeros(len),
                t: 0,
            },
        }
    }

    /// Ascent step for the given gradient.
    fn step(&mut self, gradient: &Array1<f64>) -> Array1<f64> {
        match self {
            Self::RmsProp { sq } => {
                *sq = &*sq * RMSPROP_DECAY + gradient.mapv(|g| g * g) * (1.0 - RMSPROP_DECAY);
                Array1::from_shape_fn(gradient.len(), |j| {
                    LEARNING_RATE * gradient[j] / (sq[j].sqrt() + STEP_EPS)
                })
            }
            Self::Adam { first, second, t } => {
                *t += 1;
                *first = &*first * ADAM_BETA_1 + gradient * (1.0 - ADAM_BETA_1);
                *second = &*second * ADAM_BETA_2 + gradient.mapv(|g| g * g) * (1.0 - ADAM_BETA_2);
                let bias_1 = 1.0 - ADAM_BETA_1.powi(*t as i32);
                let bias_2 = 1.0 - ADAM_BETA_2.powi(*t as i32);
                Array1::from_shape_fn(gradient.len(), |j| {
                    let m_hat = first[j] / bias_1;
                    let v_hat = second[j] / bias_2;
                    LEARNING_RATE * m_hat / (v_hat.sqrt() + STEP_EPS)
                })
            }
        }
    }
}

/// Control-variate score-function gradient of the ELBO over one mini-batch.
///
/// `scores` is `batch x 2n` (per-sample scores for every variational
/// parameter), `residuals` is the per-sample `log p - log q`.
fn elbo_gradient(scores: &Array2<f64>, residuals: &Array1<f64>) -> Array1<f64> {
    let batch = scores.nrows() as f64;
    Array1::from_shape_fn(scores.ncols(), |j| {
        let score = scores.column(j);
        let score_mean = score.sum() / batch;
        let f_mean = score
            .iter()
            .zip(residuals.iter())
            .map(|(&s, &r)| s * r)
            .sum::<f64>()
            / batch;
        let mut cov = 0.0;
        let mut var = 0.0;
        for (&s, &r) in score.iter().zip(residuals.iter()) {
            let ds = s - score_mean;
            cov += ds * (s * r - f_mean);
            var += ds * ds;
        }
        let a = if var > 0.0 { cov / var } else { 0.0 };
        score
            .iter()
            .zip(residuals.iter())
            .map(|(&s, &r)| s * r - a * (s - score_mean))
            .sum::<f64>()
            / batch
    })
}

/// BBVI fit: initialize the variational means from a blend of the posterior
/// mode and the declared starts, then ascend the ELBO for the configured
/// number of iterations.
pub(crate) fn bbvi_fit<M: Model + ?Sized>(
    model: &mut M,
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    if options.batch_size < 2 {
        return Err(FitError::InvalidOption("batch size must exceed one"));
    }
    if options.iterations == 0 {
        return Err(FitError::InvalidOption("iterations must be positive"));
    }

    let n = model.z_no();
    let phi = options
        .start
        .clone()
        .unwrap_or_else(|| model.latent_variables().starting_values());

    // Mode blend stabilizes the early iterations; families with an unstable
    // mode objective start from their declared values instead. The mode
    // search leaves the registry alone.
    let loc_init = if model.family().stable_mode_init() {
        let mode = optimize::minimize_scalar(
            &options.point,
            |beta| objective_value(model, ObjectiveKind::Posterior, beta),
            &phi,
        );
        0.8 * &mode + 0.2 * &phi
    } else {
        phi
    };
    let scale_init = options.start_scale.unwrap_or_else(QNormal::default_scale);

    let mut q: Vec<QNormal> = loc_init
        .iter()
        .map(|&loc| QNormal::new(loc, scale_init))
        .collect();
    let mut state = StepState::new(options.optimizer, 2 * n);
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    for _ in 0..options.iterations {
        let mut scores = Array2::zeros((options.batch_size, 2 * n));
        let mut residuals = Array1::zeros(options.batch_size);
        for s in 0..options.batch_size {
            let draw = Array1::from_shape_fn(n, |k| q[k].sample(&mut rng));
            let log_p = -objective_value(model, ObjectiveKind::Posterior, &draw);
            let log_q: f64 = q.iter().enumerate().map(|(k, qk)| qk.ln_pdf(draw[k])).sum();
            residuals[s] = log_p - log_q;
            for k in 0..n {
                scores[[s, k]] = q[k].score_loc(draw[k]);
                scores[[s, n + k]] = q[k].score_scale(draw[k]);
            }
        }
        let gradient = elbo_gradient(&scores, &residuals);
        // A non-finite gradient estimate would poison the step accumulators;
        // the iteration still counts, it just applies no step.
        if gradient.iter().any(|g| !g.is_finite()) {
            continue;
        }
        let step = state.step(&gradient);
        for k in 0..n {
            q[k].loc += step[k];
            q[k].scale += step[n + k];
        }
    }

    let locs = Array1::from_shape_fn(n, |k| q[k].loc);
    let ses = Array1::from_shape_fn(n, |k| q[k].scale);

    let output = super::categorize_for(model, &locs)?;
    apply_update(
        model,
        RegistryUpdate {
            values: locs,
            method: Method::Bbvi,
            std: Some(ses.mapv(f64::exp)),
            samples: None,
            q: Some(q.clone()),
        },
    );
    Ok(package(
        model,
        Method::Bbvi,
        output,
        MethodDetail::Bbvi { ses, q },
    ))
}
