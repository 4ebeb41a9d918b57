//! Random-walk Metropolis-Hastings over the negative log-posterior.

use crate::error::FitError;
use crate::fit::optimize::{self, ObjectiveKind, objective_value};
use crate::fit::{
    FitOptions, FitResult, Method, MethodDetail, RegistryUpdate, apply_update, package,
};
use crate::model::Model;

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};
use ndarray_stats::QuantileExt;
use ndarray_stats::interpolate::Linear;
use noisy_float::types::n64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Raw-scale chain and its summaries, aggregated before any link is applied.
struct RawChain {
    /// `nsims x z_no`.
    chain: Array2<f64>,
    mean: Array1<f64>,
    median: Array1<f64>,
    lower_95: Array1<f64>,
    upper_95: Array1<f64>,
}

/// Random-walk sampler with a fixed proposal covariance, scaled by the usual
/// `2.38 / sqrt(n)` factor.
struct MetropolisHastings<'a, M: Model + ?Sized> {
    model: &'a M,
    start: Array1<f64>,
    proposal_l: DMatrix<f64>,
    scale: f64,
    nsims: usize,
    rng: StdRng,
}

impl<'a, M: Model + ?Sized> MetropolisHastings<'a, M> {
    fn new(
        model: &'a M,
        start: Array1<f64>,
        cov: DMatrix<f64>,
        nsims: usize,
        seed: Option<u64>,
    ) -> Self {
        let n = start.len();
        // Non-positive-definite proposal covariances degrade to their
        // absolute diagonal.
        let proposal_l = match cov.clone().cholesky() {
            Some(chol) => chol.l(),
            None => DMatrix::from_diagonal(&cov.diagonal().map(|v| v.abs().sqrt())),
        };
        Self {
            model,
            start,
            proposal_l,
            scale: 2.38 / (n as f64).sqrt(),
            nsims,
            rng: match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            },
        }
    }

    fn propose(&mut self, current: &Array1<f64>) -> Array1<f64> {
        let n = current.len();
        let eps = DMatrix::from_fn(n, 1, |_, _| self.rng.sample::<f64, _>(StandardNormal));
        let step = &self.proposal_l * eps;
        Array1::from_shape_fn(n, |i| current[i] + self.scale * step[(i, 0)])
    }

    /// Run the chain: the first `nsims` draws are burn-in, the next `nsims`
    /// are recorded. Summaries are computed on the recorded raw draws.
    fn sample(mut self) -> RawChain {
        let n = self.start.len();
        let mut current = self.start.clone();
        let mut lp_current = -objective_value(self.model, ObjectiveKind::Posterior, &current);
        let mut chain = Array2::zeros((self.nsims, n));
        for iteration in 0..2 * self.nsims {
            let proposal = self.propose(&current);
            let lp_proposal = -objective_value(self.model, ObjectiveKind::Posterior, &proposal);
            if self.rng.random::<f64>() < (lp_proposal - lp_current).exp() {
                current = proposal;
                lp_current = lp_proposal;
            }
            if iteration >= self.nsims {
                chain.row_mut(iteration - self.nsims).assign(&current);
            }
        }

        let mean = chain
            .mean_axis(Axis(0))
            .expect("chain has at least one row");
        let quantile = |q: f64| -> Array1<f64> {
            chain
                .mapv(n64)
                .quantile_axis_mut(Axis(0), n64(q), &Linear)
                .expect("chain is non-empty and q is in range")
                .mapv(|v| v.raw())
        };
        RawChain {
            median: quantile(0.5),
            lower_95: quantile(0.025),
            upper_95: quantile(0.975),
            mean,
            chain,
        }
    }
}

/// Metropolis-Hastings fit: optionally a PML mode fit to center the proposal,
/// then the random walk, then one link application to the aggregated chain
/// and its summaries.
pub(crate) fn mcmc_fit<M: Model + ?Sized>(
    model: &mut M,
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    if options.sampler != "M-H" {
        return Err(FitError::UnsupportedSampler(options.sampler.clone()));
    }
    if options.nsims == 0 {
        return Err(FitError::InvalidOption("nsims must be positive"));
    }

    let n = model.z_no();
    let (start, cov) = if model.family().stable_mode_init() {
        // Center the walk at the posterior mode and shape the proposal from
        // the curvature there.
        let inner = optimize::optimize_fit(model, ObjectiveKind::Posterior, options)?;
        let start = model.latent_variables().values(false);
        // Curvature at the mode takes precedence; a caller-supplied
        // covariance is only consulted when the Hessian is unavailable.
        let cov = match (&inner.detail, &options.cov_matrix) {
            (
                MethodDetail::Point {
                    ihessian: Some(ihessian),
                },
                _,
            ) => DMatrix::from_fn(n, n, |i, j| {
                if i == j { ihessian[[i, i]].abs() } else { 0.0 }
            }),
            (_, Some(cov)) => DMatrix::from_fn(n, n, |i, j| cov[[i, j]]),
            (_, None) => DMatrix::identity(n, n),
        };
        (start, cov)
    } else {
        let start = options
            .start
            .clone()
            .unwrap_or_else(|| model.latent_variables().starting_values());
        let cov = match &options.cov_matrix {
            Some(cov) => DMatrix::from_fn(n, n, |i, j| cov[[i, j]]),
            None => DMatrix::identity(n, n),
        };
        (start, cov)
    };

    let raw = MetropolisHastings::new(model, start, cov, options.nsims, options.seed).sample();

    // Single transform pass, applied after aggregation: each variable's link
    // maps its raw chain column and raw summaries onto the natural scale.
    let links: Vec<_> = model
        .latent_variables()
        .z_list()
        .iter()
        .map(|z| z.prior().clone())
        .collect();
    let transform_vec = |raw: &Array1<f64>| -> Array1<f64> {
        Array1::from_shape_fn(raw.len(), |k| links[k].transform(raw[k]))
    };
    let mut samples = Array2::zeros((n, options.nsims));
    for (k, link) in links.iter().enumerate() {
        for (s, &value) in raw.chain.column(k).iter().enumerate() {
            samples[[k, s]] = link.transform(value);
        }
    }
    let chain = samples.t().to_owned();
    let mean = transform_vec(&raw.mean);
    let median = transform_vec(&raw.median);
    let lower_95 = transform_vec(&raw.lower_95);
    let upper_95 = transform_vec(&raw.upper_95);

    let output = super::categorize_for(model, &raw.mean)?;
    apply_update(
        model,
        RegistryUpdate {
            values: raw.mean,
            method: Method::MetropolisHastings,
            std: None,
            samples: Some(samples),
            q: None,
        },
    );
    Ok(package(
        model,
        Method::MetropolisHastings,
        output,
        MethodDetail::Mcmc {
            chain,
            mean,
            median,
            lower_95,
            upper_95,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fit::Fit;
    use crate::tests::NormalModel;
    use approx::assert_abs_diff_eq;

    fn options(nsims: usize) -> FitOptions {
        FitOptions {
            nsims,
            seed: Some(42),
            ..FitOptions::default()
        }
    }

    #[test]
    fn unknown_sampler_is_rejected_before_any_work() {
        let mut model = NormalModel::standard();
        let before = model.latent_variables().clone();
        let err = model
            .fit(
                Some(Method::MetropolisHastings),
                &FitOptions {
                    sampler: "NUTS".to_string(),
                    ..options(100)
                },
            )
            .unwrap_err();
        assert_eq!(err, FitError::UnsupportedSampler("NUTS".to_string()));
        assert_eq!(model.latent_variables(), &before);
    }

    #[test]
    fn zero_simulations_is_a_typed_error() {
        let mut model = NormalModel::standard();
        let before = model.latent_variables().clone();
        let err = model
            .fit(Some(Method::MetropolisHastings), &options(0))
            .unwrap_err();
        assert_eq!(err, FitError::InvalidOption("nsims must be positive"));
        assert_eq!(model.latent_variables(), &before);
    }

    #[test]
    fn chain_concentrates_near_the_mode() {
        let mut model = NormalModel::standard();
        let result = model
            .fit(Some(Method::MetropolisHastings), &options(3000))
            .unwrap();
        match result.detail {
            MethodDetail::Mcmc {
                mean,
                lower_95,
                upper_95,
                ..
            } => {
                assert_abs_diff_eq!(mean[0], model.sample_mean(), epsilon = 0.1);
                assert!(lower_95[0] < mean[0] && mean[0] < upper_95[0]);
                // Scale variable is reported on the natural (positive) scale.
                assert!(mean[1] > 0.0);
                assert!(lower_95[1] > 0.0);
            }
            other => panic!("expected MCMC detail, got {other:?}"),
        }
    }

    #[test]
    fn hessian_curvature_overrides_caller_covariance() {
        // A degenerate caller covariance must not freeze the walk when the
        // mode fit produced usable curvature.
        let mut model = NormalModel::standard();
        let opts = FitOptions {
            cov_matrix: Some(Array2::from_diag_elem(2, 1e-20)),
            ..options(500)
        };
        let result = model
            .fit(Some(Method::MetropolisHastings), &opts)
            .unwrap();
        match result.detail {
            MethodDetail::Mcmc {
                lower_95, upper_95, ..
            } => {
                assert!(upper_95[0] - lower_95[0] > 1e-4);
            }
            other => panic!("expected MCMC detail, got {other:?}"),
        }
    }

    #[test]
    fn stored_chains_are_transformed_per_variable() {
        let mut model = NormalModel::standard();
        model
            .fit(Some(Method::MetropolisHastings), &options(200))
            .unwrap();
        let lv = model.latent_variables();
        let sigma_chain = lv.get(1).unwrap().sample().unwrap();
        assert_eq!(sigma_chain.len(), 200);
        assert!(sigma_chain.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn summaries_transform_after_aggregation() {
        // The reported mean is link(raw mean), not the mean of the
        // transformed draws; with a convex link the two differ.
        let mut model = NormalModel::standard();
        let result = model
            .fit(Some(Method::MetropolisHastings), &options(500))
            .unwrap();
        let raw_mean = model.latent_variables().values(false);
        match result.detail {
            MethodDetail::Mcmc { chain, mean, .. } => {
                assert_abs_diff_eq!(mean[1], raw_mean[1].exp(), epsilon = 1e-12);
                let mean_of_transformed = chain.column(1).mean().unwrap();
                assert!((mean_of_transformed - mean[1]).abs() > 1e-12);
            }
            other => panic!("expected MCMC detail, got {other:?}"),
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let mut a = NormalModel::standard();
        let mut b = NormalModel::standard();
        let ra = a
            .fit(Some(Method::MetropolisHastings), &options(100))
            .unwrap();
        let rb = b
            .fit(Some(Method::MetropolisHastings), &options(100))
            .unwrap();
        assert_eq!(
            a.latent_variables().values(false),
            b.latent_variables().values(false)
        );
        match (&ra.detail, &rb.detail) {
            (MethodDetail::Mcmc { chain: ca, .. }, MethodDetail::Mcmc { chain: cb, .. }) => {
                assert_eq!(ca, cb);
            }
            _ => panic!("expected MCMC details"),
        }
    }
}
