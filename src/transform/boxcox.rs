//! Box-Cox power transformation.
//!
//! Makes positive, skewed data closer to normally distributed. The
//! lambda is either given or picked by profile likelihood over `[-2, 2]`.

use super::traits::Transformer;
use crate::error::{ForecastError, Result};

/// Box-Cox transformer for strictly positive series.
#[derive(Debug, Clone, Default)]
pub struct BoxCoxTransformer {
    fixed_lambda: Option<f64>,
    lambda: Option<f64>,
}

impl BoxCoxTransformer {
    /// Lambda chosen at fit time.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lambda(lambda: f64) -> Self {
        Self {
            fixed_lambda: Some(lambda),
            lambda: None,
        }
    }

    pub fn lambda(&self) -> Option<f64> {
        self.lambda
    }
}

fn forward(x: f64, lambda: f64) -> f64 {
    if x <= 0.0 {
        f64::NAN
    } else if lambda.abs() < 1e-10 {
        x.ln()
    } else {
        (x.powf(lambda) - 1.0) / lambda
    }
}

fn backward(y: f64, lambda: f64) -> f64 {
    if lambda.abs() < 1e-10 {
        return y.exp();
    }
    let base = lambda * y + 1.0;
    if base <= 0.0 {
        f64::NAN
    } else {
        base.powf(1.0 / lambda)
    }
}

// Profile log-likelihood, constants dropped.
fn log_likelihood(data: &[f64], lambda: f64) -> f64 {
    let n = data.len() as f64;
    let transformed: Vec<f64> = data.iter().map(|&x| forward(x, lambda)).collect();
    let mean = transformed.iter().sum::<f64>() / n;
    let var = transformed.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;
    if var <= 0.0 || !var.is_finite() {
        return f64::NEG_INFINITY;
    }
    let log_sum: f64 = data.iter().map(|x| x.ln()).sum();
    -0.5 * n * var.ln() + (lambda - 1.0) * log_sum
}

fn search_lambda(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 1.0;
    }
    let mut best = (1.0, f64::NEG_INFINITY);
    for i in -200..=200 {
        let lambda = i as f64 / 100.0;
        let llf = log_likelihood(data, lambda);
        if llf > best.1 {
            best = (lambda, llf);
        }
    }
    let start = (best.0 - 0.01).max(-2.0);
    let end = (best.0 + 0.01).min(2.0);
    for i in 0..=100 {
        let lambda = start + (end - start) * i as f64 / 100.0;
        let llf = log_likelihood(data, lambda);
        if llf > best.1 {
            best = (lambda, llf);
        }
    }
    best.0
}

impl Transformer for BoxCoxTransformer {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let data: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if data.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        if let Some(bad) = data.iter().find(|&&x| x <= 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Box-Cox requires strictly positive values, found {}",
                bad
            )));
        }
        self.lambda = Some(self.fixed_lambda.unwrap_or_else(|| search_lambda(&data)));
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let lambda = self.lambda.ok_or_else(|| {
            ForecastError::InvalidParameter("BoxCoxTransformer must be fitted before use".into())
        })?;
        Ok(values.iter().map(|&x| forward(x, lambda)).collect())
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let lambda = self.lambda.ok_or_else(|| {
            ForecastError::InvalidParameter("BoxCoxTransformer must be fitted before use".into())
        })?;
        Ok(values.iter().map(|&y| backward(y, lambda)).collect())
    }

    fn is_fitted(&self) -> bool {
        self.lambda.is_some()
    }

    fn name(&self) -> &str {
        "BoxCoxTransformer"
    }

    fn box_clone(&self) -> Box<dyn Transformer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_case_when_lambda_is_zero() {
        let mut bc = BoxCoxTransformer::with_lambda(0.0);
        let out = bc.fit_transform(&[1.0, std::f64::consts::E]).unwrap();
        assert_relative_eq!(out[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(out[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn inverse_recovers_input() {
        let data: Vec<f64> = (1..=30).map(|i| (i as f64).powi(2)).collect();
        let mut bc = BoxCoxTransformer::new();
        let t = bc.fit_transform(&data).unwrap();
        let lambda = bc.lambda().unwrap();
        assert!((-2.0..=2.0).contains(&lambda));
        let back = bc.inverse_transform(&t).unwrap();
        for (a, b) in data.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, max_relative = 1e-9);
        }
    }

    #[test]
    fn rejects_non_positive_values() {
        let mut bc = BoxCoxTransformer::new();
        assert!(bc.fit(&[1.0, 0.0, 2.0]).is_err());
    }
}
