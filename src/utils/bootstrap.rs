//! Residual bootstrapping of multi-step forecasts.
//!
//! Two resampling policies feed the recursive loop:
//!
//! - **Flat**: an `(steps, n_boot)` matrix of residuals is drawn step-major
//!   from one seeded generator before any replicate runs; replicate `b`
//!   adds column `b` step by step.
//! - **Binned**: every replicate owns a generator seeded from the parent
//!   and, at each step, draws from the bin of that step's unperturbed
//!   prediction.
//!
//! Replicates are independent once their residuals or seeds are fixed, so
//! they run on rayon and are collected in replicate order.
//!
//! The two policies are not equivalent in distribution for small `n_boot`
//! and are tested separately.

use crate::error::{ForecastError, Result};
use crate::residuals::{BinnedResiduals, QuantileBinner};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

/// Configuration for bootstrapped predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    /// Number of bootstrap replicates.
    pub n_boot: usize,
    /// Seed of the parent generator.
    pub seed: u64,
    /// Draw from in-sample residuals (otherwise out-of-sample ones).
    pub use_in_sample_residuals: bool,
    /// Condition residuals on the predicted value's bin.
    pub use_binned_residuals: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            n_boot: 250,
            seed: 123,
            use_in_sample_residuals: true,
            use_binned_residuals: false,
        }
    }
}

impl BootstrapConfig {
    /// Create a new bootstrap config with the given number of replicates.
    pub fn new(n_boot: usize) -> Self {
        Self {
            n_boot,
            ..Default::default()
        }
    }

    /// Set random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Use residuals installed with `set_out_sample_residuals`.
    pub fn with_out_sample_residuals(mut self) -> Self {
        self.use_in_sample_residuals = false;
        self
    }

    pub fn with_binned_residuals(mut self) -> Self {
        self.use_binned_residuals = true;
        self
    }
}

/// Source of the residual added at each step of one replicate.
pub trait ResidualDraw {
    /// Residual for `step` given its unperturbed `prediction`.
    fn draw(&mut self, step: usize, prediction: f64) -> Result<f64>;
}

/// No perturbation: point predictions.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResiduals;

impl ResidualDraw for NoResiduals {
    fn draw(&mut self, _step: usize, _prediction: f64) -> Result<f64> {
        Ok(0.0)
    }
}

/// Pre-drawn residual per step.
#[derive(Debug, Clone)]
pub struct FlatDraw {
    residuals: Vec<f64>,
}

impl FlatDraw {
    pub fn new(residuals: Vec<f64>) -> Self {
        Self { residuals }
    }
}

impl ResidualDraw for FlatDraw {
    fn draw(&mut self, step: usize, _prediction: f64) -> Result<f64> {
        self.residuals
            .get(step)
            .copied()
            .ok_or(ForecastError::IndexOutOfBounds {
                index: step,
                size: self.residuals.len(),
            })
    }
}

/// Residual drawn from the bin of the unperturbed prediction.
pub struct BinnedDraw<'a> {
    pools: &'a BinnedResiduals,
    binner: &'a QuantileBinner,
    rng: StdRng,
}

impl<'a> BinnedDraw<'a> {
    pub fn new(pools: &'a BinnedResiduals, binner: &'a QuantileBinner, seed: u64) -> Self {
        Self {
            pools,
            binner,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl ResidualDraw for BinnedDraw<'_> {
    fn draw(&mut self, step: usize, prediction: f64) -> Result<f64> {
        let bin = self.binner.bin_of(prediction)?;
        match self.pools.get(bin) {
            Some(pool) if !pool.is_empty() && pool.iter().all(|r| !r.is_nan()) => {
                Ok(pool[self.rng.gen_range(0..pool.len())])
            }
            _ => Err(ForecastError::ResidualsUnavailable(format!(
                "residual bin {} used at step {} is missing, empty or contains NaN",
                bin,
                step + 1
            ))),
        }
    }
}

/// Residuals available to a bootstrap run.
#[derive(Clone, Copy)]
pub enum ResidualSource<'a> {
    Flat(&'a [f64]),
    Binned {
        pools: &'a BinnedResiduals,
        binner: &'a QuantileBinner,
    },
}

/// Seeded bootstrap driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BootstrapSampler {
    n_boot: usize,
    seed: u64,
}

impl BootstrapSampler {
    pub fn new(n_boot: usize, seed: u64) -> Result<Self> {
        if n_boot == 0 {
            return Err(ForecastError::InvalidParameter(
                "n_boot must be greater than 0".to_string(),
            ));
        }
        Ok(Self { n_boot, seed })
    }

    pub fn from_config(config: &BootstrapConfig) -> Result<Self> {
        Self::new(config.n_boot, config.seed)
    }

    pub fn n_boot(&self) -> usize {
        self.n_boot
    }

    /// `(steps, n_boot)` residuals drawn with replacement, step-major.
    pub fn flat_draws(&self, pool: &[f64], steps: usize) -> Result<Vec<Vec<f64>>> {
        if pool.is_empty() {
            return Err(ForecastError::ResidualsUnavailable(
                "residual pool is empty".to_string(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok((0..steps)
            .map(|_| {
                (0..self.n_boot)
                    .map(|_| pool[rng.gen_range(0..pool.len())])
                    .collect()
            })
            .collect())
    }

    /// One sub-seed per replicate, drawn from the parent generator.
    pub fn replicate_seeds(&self) -> Vec<u64> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.n_boot).map(|_| rng.gen::<u64>()).collect()
    }

    /// Run `replicate` once per bootstrap replicate and return the ensemble
    /// as `ensemble[step][replicate]`.
    ///
    /// `replicate` must produce `steps` values using the draw it is given.
    pub fn run<F>(&self, steps: usize, source: ResidualSource<'_>, replicate: F) -> Result<Vec<Vec<f64>>>
    where
        F: Fn(&mut dyn ResidualDraw) -> Result<Vec<f64>> + Sync,
    {
        let replicates: Vec<Vec<f64>> = match source {
            ResidualSource::Flat(pool) => {
                debug!(n_boot = self.n_boot, steps, "flat bootstrap");
                let draws = self.flat_draws(pool, steps)?;
                (0..self.n_boot)
                    .into_par_iter()
                    .map(|b| {
                        let mut draw = FlatDraw::new(draws.iter().map(|row| row[b]).collect());
                        replicate(&mut draw)
                    })
                    .collect::<Result<_>>()?
            }
            ResidualSource::Binned { pools, binner } => {
                debug!(n_boot = self.n_boot, steps, bins = pools.n_bins(), "binned bootstrap");
                self.replicate_seeds()
                    .into_par_iter()
                    .map(|seed| {
                        let mut draw = BinnedDraw::new(pools, binner, seed);
                        replicate(&mut draw)
                    })
                    .collect::<Result<_>>()?
            }
        };
        transpose(replicates, steps)
    }

    /// Perturb fixed per-step predictions with residuals drawn from each
    /// step's own pool, steps in the given order, one generator throughout.
    pub fn perturb(&self, point: &[f64], pools: &[&[f64]]) -> Result<Vec<Vec<f64>>> {
        if point.len() != pools.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: point.len(),
                got: pools.len(),
            });
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        point
            .iter()
            .zip(pools)
            .map(|(&p, pool)| {
                if pool.is_empty() {
                    return Err(ForecastError::ResidualsUnavailable(
                        "residual pool is empty".to_string(),
                    ));
                }
                Ok((0..self.n_boot)
                    .map(|_| p + pool[rng.gen_range(0..pool.len())])
                    .collect())
            })
            .collect()
    }
}

fn transpose(replicates: Vec<Vec<f64>>, steps: usize) -> Result<Vec<Vec<f64>>> {
    let mut ensemble = vec![Vec::with_capacity(replicates.len()); steps];
    for rep in replicates {
        if rep.len() != steps {
            return Err(ForecastError::DimensionMismatch {
                expected: steps,
                got: rep.len(),
            });
        }
        for (s, v) in rep.into_iter().enumerate() {
            ensemble[s].push(v);
        }
    }
    Ok(ensemble)
}
