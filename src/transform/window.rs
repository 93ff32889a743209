//! Trailing window statistics.

use crate::error::{ForecastError, Result};
use crate::utils::stats;
use std::fmt;
use std::str::FromStr;

/// Statistic computed over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollingStat {
    Mean,
    Std,
    Min,
    Max,
    Sum,
    Median,
}

impl RollingStat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollingStat::Mean => "mean",
            RollingStat::Std => "std",
            RollingStat::Min => "min",
            RollingStat::Max => "max",
            RollingStat::Sum => "sum",
            RollingStat::Median => "median",
        }
    }

    /// Value of the statistic over `window`. Std uses the sample estimator.
    pub fn compute(&self, window: &[f64]) -> f64 {
        if window.is_empty() {
            return f64::NAN;
        }
        match self {
            RollingStat::Mean => stats::mean(window),
            RollingStat::Std => stats::std_dev(window),
            RollingStat::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
            RollingStat::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            RollingStat::Sum => window.iter().sum(),
            RollingStat::Median => stats::median(window),
        }
    }
}

impl fmt::Display for RollingStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollingStat {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mean" => Ok(RollingStat::Mean),
            "std" => Ok(RollingStat::Std),
            "min" => Ok(RollingStat::Min),
            "max" => Ok(RollingStat::Max),
            "sum" => Ok(RollingStat::Sum),
            "median" => Ok(RollingStat::Median),
            other => Err(ForecastError::InvalidParameter(format!(
                "unknown rolling statistic `{}`",
                other
            ))),
        }
    }
}

/// Trailing rolling statistic: position `i` summarises `series[i+1-window..=i]`,
/// NaN until the window is full.
pub fn rolling(series: &[f64], window: usize, stat: RollingStat) -> Vec<f64> {
    let mut result = vec![f64::NAN; series.len()];
    if window == 0 {
        return result;
    }
    for i in (window - 1)..series.len() {
        result[i] = stat.compute(&series[i + 1 - window..=i]);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rolling_mean_trailing() {
        let out = rolling(&[1.0, 2.0, 3.0, 4.0], 2, RollingStat::Mean);
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[1.5, 2.5, 3.5]);
    }

    #[test]
    fn rolling_std_uses_sample_estimator() {
        let out = rolling(&[1.0, 3.0, 5.0], 3, RollingStat::Std);
        assert_relative_eq!(out[2], 2.0);
    }

    #[test]
    fn stat_names_parse_back() {
        for stat in [
            RollingStat::Mean,
            RollingStat::Std,
            RollingStat::Min,
            RollingStat::Max,
            RollingStat::Sum,
            RollingStat::Median,
        ] {
            assert_eq!(stat.as_str().parse::<RollingStat>().unwrap(), stat);
        }
        assert!("mode".parse::<RollingStat>().is_err());
    }
}
