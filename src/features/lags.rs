//! Lag specifications and supervised design matrices.
//!
//! Column `i` of a lag matrix holds the series shifted by `lags[i]`, so row
//! `r` of the recursive matrix predicts `y[max_lag + r]` from
//! `y[max_lag + r - lags[i]]`.

use crate::core::Matrix;
use crate::error::{ForecastError, Result};
use std::fmt;

/// Ordered set of positive lags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LagSpec {
    lags: Vec<usize>,
}

impl LagSpec {
    /// Explicit lags, kept in declared order.
    pub fn new(lags: Vec<usize>) -> Result<Self> {
        if lags.is_empty() {
            return Err(ForecastError::InvalidLags(
                "at least one lag is required".to_string(),
            ));
        }
        if lags.contains(&0) {
            return Err(ForecastError::InvalidLags(format!(
                "lags must be greater than 0, got {:?}",
                lags
            )));
        }
        for (i, lag) in lags.iter().enumerate() {
            if lags[..i].contains(lag) {
                return Err(ForecastError::InvalidLags(format!(
                    "lag {} is repeated in {:?}",
                    lag, lags
                )));
            }
        }
        Ok(Self { lags })
    }

    /// Lags `1..=n`.
    pub fn up_to(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(ForecastError::InvalidLags(
                "number of lags must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            lags: (1..=n).collect(),
        })
    }

    pub fn lags(&self) -> &[usize] {
        &self.lags
    }

    pub fn len(&self) -> usize {
        self.lags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lags.is_empty()
    }

    pub fn max_lag(&self) -> usize {
        self.lags.iter().copied().max().unwrap_or(0)
    }

    /// Column names `{prefix}lag_{k}`.
    pub fn names(&self, prefix: &str) -> Vec<String> {
        self.lags
            .iter()
            .map(|k| format!("{}lag_{}", prefix, k))
            .collect()
    }

    /// Lag values read from the end of `window`: entry `i` is
    /// `window[len - lags[i]]`.
    pub fn row_from_window(&self, window: &[f64]) -> Result<Vec<f64>> {
        let max_lag = self.max_lag();
        if window.len() < max_lag {
            return Err(ForecastError::InsufficientData {
                needed: max_lag,
                got: window.len(),
            });
        }
        let n = window.len();
        Ok(self.lags.iter().map(|&k| window[n - k]).collect())
    }
}

impl fmt::Display for LagSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.lags)
    }
}

/// Lag matrix and aligned targets for one-step-ahead training.
///
/// Returns `n - max_lag` rows; errors when `n <= max_lag`.
pub fn create_lags(y: &[f64], lags: &LagSpec) -> Result<(Matrix, Vec<f64>)> {
    let n = y.len();
    let max_lag = lags.max_lag();
    if n <= max_lag {
        return Err(ForecastError::InsufficientData {
            needed: max_lag + 1,
            got: n,
        });
    }
    let n_rows = n - max_lag;
    let mut x = Matrix::zeros(n_rows, lags.len());
    for (j, &lag) in lags.lags().iter().enumerate() {
        for (r, v) in y[max_lag - lag..n - lag].iter().enumerate() {
            x.set(r, j, *v);
        }
    }
    Ok((x, y[max_lag..].to_vec()))
}

/// Lag matrix with one target column per horizon.
///
/// With `window_size` rows of history and `steps` horizons the matrix has
/// `n - window_size - (steps - 1)` rows; target column `s` holds
/// `y[window_size + s..window_size + s + rows]`. `lags` may be `None` for a
/// series that only contributes targets or window features.
pub fn create_direct_lags(
    y: &[f64],
    lags: Option<&LagSpec>,
    window_size: usize,
    steps: usize,
) -> Result<(Matrix, Matrix)> {
    let n = y.len();
    if steps == 0 {
        return Err(ForecastError::InvalidSteps(
            "steps must be greater than 0".to_string(),
        ));
    }
    if let Some(l) = lags {
        if l.max_lag() > window_size {
            return Err(ForecastError::InvalidParameter(format!(
                "window size {} is smaller than max lag {}",
                window_size,
                l.max_lag()
            )));
        }
    }
    if n < window_size + steps {
        return Err(ForecastError::InsufficientData {
            needed: window_size + steps,
            got: n,
        });
    }
    let n_rows = n - window_size - (steps - 1);

    let x = match lags {
        Some(l) => {
            let mut x = Matrix::zeros(n_rows, l.len());
            for (j, &lag) in l.lags().iter().enumerate() {
                for r in 0..n_rows {
                    x.set(r, j, y[window_size - lag + r]);
                }
            }
            x
        }
        None => Matrix::zeros(n_rows, 0),
    };

    let mut targets = Matrix::zeros(n_rows, steps);
    for s in 0..steps {
        for r in 0..n_rows {
            targets.set(r, s, y[window_size + s + r]);
        }
    }
    Ok((x, targets))
}
