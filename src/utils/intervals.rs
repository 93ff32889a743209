//! Reduction of bootstrap ensembles to intervals, quantiles and fitted
//! distribution parameters.

use super::distributions::Distribution;
use super::stats;
use crate::error::{ForecastError, Result};

/// Validate a percentile interval `[lower, upper]`, both in `[0, 100]`.
pub fn check_interval(interval: [f64; 2]) -> Result<()> {
    let [lower, upper] = interval;
    if !(0.0..100.0).contains(&lower) {
        return Err(ForecastError::InvalidInterval(format!(
            "lower interval bound ({}) must be >= 0 and < 100",
            lower
        )));
    }
    if !(upper > 0.0 && upper <= 100.0) {
        return Err(ForecastError::InvalidInterval(format!(
            "upper interval bound ({}) must be > 0 and <= 100",
            upper
        )));
    }
    if lower >= upper {
        return Err(ForecastError::InvalidInterval(format!(
            "lower interval bound ({}) must be less than upper interval bound ({})",
            lower, upper
        )));
    }
    Ok(())
}

/// Validate quantiles, each in `[0, 1]`.
pub fn check_quantiles(quantiles: &[f64]) -> Result<()> {
    if quantiles.is_empty() {
        return Err(ForecastError::InvalidInterval(
            "at least one quantile is required".to_string(),
        ));
    }
    if let Some(q) = quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
        return Err(ForecastError::InvalidInterval(format!(
            "all elements in `quantiles` must be >= 0 and <= 1, got {}",
            q
        )));
    }
    Ok(())
}

/// Per-step summaries of an ensemble laid out as `ensemble[step][replicate]`.
#[derive(Debug, Clone, Copy)]
pub struct IntervalEstimator<'a> {
    ensemble: &'a [Vec<f64>],
}

impl<'a> IntervalEstimator<'a> {
    pub fn new(ensemble: &'a [Vec<f64>]) -> Self {
        Self { ensemble }
    }

    pub fn steps(&self) -> usize {
        self.ensemble.len()
    }

    /// Empirical quantiles per step, linear interpolation.
    pub fn quantiles(&self, quantiles: &[f64]) -> Result<Vec<Vec<f64>>> {
        check_quantiles(quantiles)?;
        Ok(self
            .ensemble
            .iter()
            .map(|row| stats::quantiles(row, quantiles))
            .collect())
    }

    /// Same as [`quantiles`](Self::quantiles) with values in `[0, 100]`.
    pub fn percentiles(&self, percentiles: &[f64]) -> Result<Vec<Vec<f64>>> {
        if let Some(p) = percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(ForecastError::InvalidInterval(format!(
                "percentiles must be >= 0 and <= 100, got {}",
                p
            )));
        }
        let qs: Vec<f64> = percentiles.iter().map(|p| p / 100.0).collect();
        self.quantiles(&qs)
    }

    /// Lower and upper bound per step for a percentile interval.
    pub fn interval(&self, interval: [f64; 2]) -> Result<(Vec<f64>, Vec<f64>)> {
        check_interval(interval)?;
        let bounds = self.percentiles(&interval)?;
        Ok(bounds.into_iter().map(|b| (b[0], b[1])).unzip())
    }

    /// Fitted parameters per step, in the distribution's declared order.
    pub fn fit_distribution(&self, distribution: &dyn Distribution) -> Result<Vec<Vec<f64>>> {
        self.ensemble
            .iter()
            .map(|row| distribution.fit(row))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::distributions::Normal;
    use approx::assert_relative_eq;

    #[test]
    fn interval_validation() {
        assert!(check_interval([5.0, 95.0]).is_ok());
        assert!(check_interval([0.0, 100.0]).is_ok());
        assert!(check_interval([-1.0, 95.0]).is_err());
        assert!(check_interval([5.0, 101.0]).is_err());
        assert!(check_interval([50.0, 50.0]).is_err());
        assert!(check_interval([60.0, 40.0]).is_err());
    }

    #[test]
    fn quantile_validation() {
        assert!(check_quantiles(&[0.0, 0.5, 1.0]).is_ok());
        assert!(check_quantiles(&[]).is_err());
        assert!(matches!(
            check_quantiles(&[0.5, 1.5]),
            Err(ForecastError::InvalidInterval(_))
        ));
    }

    #[test]
    fn per_step_bounds() {
        let ensemble = vec![
            (0..=100).map(|v| v as f64).collect::<Vec<_>>(),
            (0..=100).map(|v| 2.0 * v as f64).collect::<Vec<_>>(),
        ];
        let est = IntervalEstimator::new(&ensemble);
        let (lower, upper) = est.interval([5.0, 95.0]).unwrap();
        assert_relative_eq!(lower[0], 5.0);
        assert_relative_eq!(upper[0], 95.0);
        assert_relative_eq!(lower[1], 10.0);
        assert_relative_eq!(upper[1], 190.0);

        let q = est.quantiles(&[0.5]).unwrap();
        assert_relative_eq!(q[1][0], 100.0);
        assert!(est.percentiles(&[101.0]).is_err());
    }

    #[test]
    fn distribution_fit_per_step() {
        let ensemble = vec![vec![1.0, 3.0], vec![2.0, 2.0]];
        let params = IntervalEstimator::new(&ensemble)
            .fit_distribution(&Normal)
            .unwrap();
        assert_eq!(params, vec![vec![2.0, 1.0], vec![2.0, 0.0]]);
    }
}
