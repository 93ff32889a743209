//! Rolling-statistic predictors computed from the window preceding each target.

use crate::core::Matrix;
use crate::error::{ForecastError, Result};
use crate::transform::{rolling, RollingStat};

/// Rolling statistics paired with window sizes.
///
/// Feature `i` is `stats[i]` over the last `window_sizes[i]` observations
/// before the target, named `roll_{stat}_{window}`.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingFeatures {
    stats: Vec<RollingStat>,
    window_sizes: Vec<usize>,
}

impl RollingFeatures {
    pub fn new(stats: Vec<RollingStat>, window_sizes: Vec<usize>) -> Result<Self> {
        if stats.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "at least one rolling statistic is required".to_string(),
            ));
        }
        if stats.len() != window_sizes.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: stats.len(),
                got: window_sizes.len(),
            });
        }
        if window_sizes.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "rolling window sizes must be greater than 0".to_string(),
            ));
        }
        let rf = Self {
            stats,
            window_sizes,
        };
        let names = rf.feature_names();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(ForecastError::InvalidParameter(format!(
                    "rolling feature `{}` is repeated",
                    name
                )));
            }
        }
        Ok(rf)
    }

    /// Same window for every statistic.
    pub fn with_window(stats: Vec<RollingStat>, window: usize) -> Result<Self> {
        let n = stats.len();
        Self::new(stats, vec![window; n])
    }

    pub fn max_window(&self) -> usize {
        self.window_sizes.iter().copied().max().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.stats
            .iter()
            .zip(&self.window_sizes)
            .map(|(s, w)| format!("roll_{}_{}", s, w))
            .collect()
    }

    /// Features for `n_rows` consecutive targets starting at `first_target`.
    ///
    /// Row `r` summarises `y[first_target + r - w..first_target + r]`.
    pub fn transform_batch(&self, y: &[f64], first_target: usize, n_rows: usize) -> Result<Matrix> {
        if first_target < self.max_window() {
            return Err(ForecastError::InsufficientData {
                needed: self.max_window(),
                got: first_target,
            });
        }
        if first_target + n_rows > y.len() {
            return Err(ForecastError::InsufficientData {
                needed: first_target + n_rows,
                got: y.len(),
            });
        }
        let columns: Vec<Vec<f64>> = self
            .stats
            .iter()
            .zip(&self.window_sizes)
            .map(|(stat, &w)| {
                let rolled = rolling(&y[..first_target + n_rows - 1], w, *stat);
                (0..n_rows).map(|r| rolled[first_target + r - 1]).collect()
            })
            .collect();
        Matrix::from_columns(n_rows, &columns)
    }

    /// Features for the value that follows `window`.
    pub fn transform(&self, window: &[f64]) -> Result<Vec<f64>> {
        if window.len() < self.max_window() {
            return Err(ForecastError::InsufficientData {
                needed: self.max_window(),
                got: window.len(),
            });
        }
        let n = window.len();
        Ok(self
            .stats
            .iter()
            .zip(&self.window_sizes)
            .map(|(stat, &w)| stat.compute(&window[n - w..]))
            .collect())
    }
}
