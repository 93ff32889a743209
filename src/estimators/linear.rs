//! Weighted ordinary least squares.
//!
//! Solves the normal equations `X'WX b = X'Wy` with a Cholesky
//! factorisation. A tiny ridge on the diagonal keeps collinear lag columns
//! solvable.

use super::traits::Regressor;
use crate::core::Matrix;
use crate::error::{ForecastError, Result};

/// Linear regression with optional intercept.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    fit_intercept: bool,
    ridge: f64,
    coefficients: Option<Vec<f64>>,
    intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self {
            fit_intercept: true,
            ridge: 1e-8,
            coefficients: None,
            intercept: 0.0,
        }
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Diagonal penalty added to `X'WX`.
    pub fn with_ridge(mut self, ridge: f64) -> Self {
        self.ridge = ridge.max(0.0);
        self
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.coefficients.as_deref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &Matrix, y: &[f64], sample_weight: Option<&[f64]>) -> Result<()> {
        let n = x.n_rows();
        if n == 0 {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        if y.len() != n {
            return Err(ForecastError::DimensionMismatch {
                expected: n,
                got: y.len(),
            });
        }
        if let Some(w) = sample_weight {
            if w.len() != n {
                return Err(ForecastError::DimensionMismatch {
                    expected: n,
                    got: w.len(),
                });
            }
        }

        let k = x.n_cols();
        let offset = usize::from(self.fit_intercept);
        let p = k + offset;
        let mut xtx = vec![vec![0.0; p]; p];
        let mut xty = vec![0.0; p];
        let mut row = vec![0.0; p];

        for i in 0..n {
            let w = sample_weight.map_or(1.0, |w| w[i]);
            if offset == 1 {
                row[0] = 1.0;
            }
            row[offset..].copy_from_slice(x.row(i));
            for a in 0..p {
                let wa = w * row[a];
                xty[a] += wa * y[i];
                for b in 0..=a {
                    xtx[a][b] += wa * row[b];
                }
            }
        }
        for a in 0..p {
            for b in 0..a {
                xtx[b][a] = xtx[a][b];
            }
            xtx[a][a] += self.ridge;
        }

        let beta = solve_symmetric(&xtx, &xty).ok_or_else(|| {
            ForecastError::ComputationError(
                "linear regression failed: normal matrix not positive definite".into(),
            )
        })?;
        self.intercept = if self.fit_intercept { beta[0] } else { 0.0 };
        self.coefficients = Some(beta[offset..].to_vec());
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let coef = self.coefficients.as_ref().ok_or(ForecastError::FitRequired)?;
        if x.n_cols() != coef.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: coef.len(),
                got: x.n_cols(),
            });
        }
        Ok(x
            .rows()
            .map(|r| self.intercept + r.iter().zip(coef).map(|(a, b)| a * b).sum::<f64>())
            .collect())
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.coefficients.clone()
    }

    fn name(&self) -> &str {
        "LinearRegression"
    }
}

/// Solve `A x = b` for symmetric positive definite `A`.
pub(crate) fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    if n == 0 || a.len() != n {
        return None;
    }

    // A = L L'
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum = a[i][j] - (0..j).map(|k| l[i][k] * l[j][k]).sum::<f64>();
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    let mut z = vec![0.0; n];
    for i in 0..n {
        z[i] = (b[i] - (0..i).map(|j| l[i][j] * z[j]).sum::<f64>()) / l[i][i];
    }
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        x[i] = (z[i] - ((i + 1)..n).map(|j| l[j][i] * x[j]).sum::<f64>()) / l[i][i];
    }
    Some(x)
}
