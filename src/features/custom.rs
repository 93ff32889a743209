//! Predictors computed by a user function over a trailing window.

use crate::core::Matrix;
use crate::error::{ForecastError, Result};
use std::fmt;
use std::sync::Arc;

/// Maps a window of past values, oldest first, to one predictor row.
pub type PredictorFn = Arc<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>;

/// A predictor function plus the number of past values it reads.
///
/// The function receives exactly `window_size` values and must return rows
/// of the same length on every call.
///
/// # Example
///
/// ```
/// use autoreg_forecast::features::CustomPredictors;
///
/// // Last three values, most recent first, plus their mean.
/// let predictors = CustomPredictors::new(
///     |w: &[f64]| vec![w[2], w[1], w[0], (w[0] + w[1] + w[2]) / 3.0],
///     3,
/// )
/// .unwrap();
///
/// let (x, y) = predictors.create(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
/// assert_eq!(x.row(0), &[3.0, 2.0, 1.0, 2.0]);
/// assert_eq!(y, vec![4.0, 5.0]);
/// ```
#[derive(Clone)]
pub struct CustomPredictors {
    func: PredictorFn,
    window_size: usize,
    names: Option<Vec<String>>,
}

impl CustomPredictors {
    pub fn new<F>(func: F, window_size: usize) -> Result<Self>
    where
        F: Fn(&[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        if window_size == 0 {
            return Err(ForecastError::InvalidParameter(
                "window_size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            func: Arc::new(func),
            window_size,
            names: None,
        })
    }

    /// Column names of the rows. Defaults to `custom_predictor_{i}`.
    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Names of `n_predictors` columns.
    pub fn names(&self, n_predictors: usize) -> Result<Vec<String>> {
        match &self.names {
            Some(names) if names.len() != n_predictors => Err(ForecastError::InvalidParameter(
                format!(
                    "{} predictor names given but the function returns {} values",
                    names.len(),
                    n_predictors
                ),
            )),
            Some(names) => Ok(names.clone()),
            None => Ok((0..n_predictors)
                .map(|i| format!("custom_predictor_{}", i))
                .collect()),
        }
    }

    /// Row of predictors from the last `window_size` values of `window`.
    pub fn row(&self, window: &[f64]) -> Result<Vec<f64>> {
        if window.len() < self.window_size {
            return Err(ForecastError::InsufficientData {
                needed: self.window_size,
                got: window.len(),
            });
        }
        let row = (self.func)(&window[window.len() - self.window_size..]);
        if row.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "predictor function returned no values".to_string(),
            ));
        }
        Ok(row)
    }

    /// Predictor matrix and aligned targets: row `r` is built from
    /// `y[r..r + window_size]` and predicts `y[r + window_size]`.
    pub fn create(&self, y: &[f64]) -> Result<(Matrix, Vec<f64>)> {
        let n = y.len();
        if n <= self.window_size {
            return Err(ForecastError::InsufficientData {
                needed: self.window_size + 1,
                got: n,
            });
        }
        let rows = (self.window_size..n)
            .map(|t| self.row(&y[t - self.window_size..t]))
            .collect::<Result<Vec<_>>>()?;
        let width = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(ForecastError::DimensionMismatch {
                expected: width,
                got: bad.len(),
            });
        }
        Ok((Matrix::from_rows(rows)?, y[self.window_size..].to_vec()))
    }
}

impl fmt::Debug for CustomPredictors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredictors")
            .field("window_size", &self.window_size)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for CustomPredictors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "custom function (window size {})", self.window_size)
    }
}
