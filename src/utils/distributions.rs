//! Parametric distributions fitted to bootstrap samples.
//!
//! Each distribution declares its parameter names and a closed-form
//! maximum likelihood (or moment) fit. Normal and Laplace quantiles come
//! from `statrs`; uniform and exponential quantiles are closed forms.

use crate::error::{ForecastError, Result};
use statrs::distribution::{ContinuousCDF, Laplace as StatrsLaplace, Normal as StatrsNormal};
use statrs::statistics::{Data, Median, Statistics};

/// A distribution whose parameters can be estimated from samples.
pub trait Distribution: Send + Sync {
    fn name(&self) -> &str;

    /// Names of the values returned by [`fit`](Distribution::fit), in order.
    fn param_names(&self) -> &'static [&'static str];

    /// Estimate the parameters from `samples`.
    fn fit(&self, samples: &[f64]) -> Result<Vec<f64>>;

    /// Quantile `q` of the distribution with the given parameters.
    fn quantile(&self, params: &[f64], q: f64) -> Result<f64>;
}

fn check_samples(samples: &[f64]) -> Result<()> {
    if samples.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if samples.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::MissingValues("distribution samples".to_string()));
    }
    Ok(())
}

fn check_params(params: &[f64], expected: usize) -> Result<()> {
    if params.len() != expected {
        return Err(ForecastError::DimensionMismatch {
            expected,
            got: params.len(),
        });
    }
    Ok(())
}

fn check_q(q: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&q) {
        return Err(ForecastError::InvalidInterval(format!(
            "quantile {} must be between 0 and 1",
            q
        )));
    }
    Ok(())
}

fn statrs_err(e: statrs::StatsError) -> ForecastError {
    ForecastError::ComputationError(e.to_string())
}

/// Normal distribution, `loc` = mean and `scale` = population std.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normal;

impl Distribution for Normal {
    fn name(&self) -> &str {
        "norm"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["loc", "scale"]
    }

    fn fit(&self, samples: &[f64]) -> Result<Vec<f64>> {
        check_samples(samples)?;
        Ok(vec![samples.mean(), samples.population_std_dev()])
    }

    fn quantile(&self, params: &[f64], q: f64) -> Result<f64> {
        check_params(params, 2)?;
        check_q(q)?;
        if params[1] == 0.0 {
            return Ok(params[0]);
        }
        let d = StatrsNormal::new(params[0], params[1]).map_err(statrs_err)?;
        Ok(d.inverse_cdf(q))
    }
}

/// Laplace distribution, `loc` = median and `scale` = mean absolute deviation
/// from the median.
#[derive(Debug, Clone, Copy, Default)]
pub struct Laplace;

impl Distribution for Laplace {
    fn name(&self) -> &str {
        "laplace"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["loc", "scale"]
    }

    fn fit(&self, samples: &[f64]) -> Result<Vec<f64>> {
        check_samples(samples)?;
        let loc = Data::new(samples.to_vec()).median();
        let scale = samples.iter().map(|x| (x - loc).abs()).mean();
        Ok(vec![loc, scale])
    }

    fn quantile(&self, params: &[f64], q: f64) -> Result<f64> {
        check_params(params, 2)?;
        check_q(q)?;
        if params[1] == 0.0 {
            return Ok(params[0]);
        }
        let d = StatrsLaplace::new(params[0], params[1]).map_err(statrs_err)?;
        Ok(d.inverse_cdf(q))
    }
}

/// Uniform distribution over `[loc, loc + scale]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl Distribution for Uniform {
    fn name(&self) -> &str {
        "uniform"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["loc", "scale"]
    }

    fn fit(&self, samples: &[f64]) -> Result<Vec<f64>> {
        check_samples(samples)?;
        let min = samples.min();
        let max = samples.max();
        Ok(vec![min, max - min])
    }

    fn quantile(&self, params: &[f64], q: f64) -> Result<f64> {
        check_params(params, 2)?;
        check_q(q)?;
        Ok(params[0] + q * params[1])
    }
}

/// Shifted exponential, `loc` = minimum and `scale` = mean excess over it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential;

impl Distribution for Exponential {
    fn name(&self) -> &str {
        "expon"
    }

    fn param_names(&self) -> &'static [&'static str] {
        &["loc", "scale"]
    }

    fn fit(&self, samples: &[f64]) -> Result<Vec<f64>> {
        check_samples(samples)?;
        let loc = samples.min();
        Ok(vec![loc, samples.mean() - loc])
    }

    fn quantile(&self, params: &[f64], q: f64) -> Result<f64> {
        check_params(params, 2)?;
        check_q(q)?;
        if params[1] == 0.0 {
            return Ok(params[0]);
        }
        Ok(params[0] - params[1] * (-q).ln_1p())
    }
}
