//! Scaling transformers.
//!
//! Both scalers store a center and a scale so that
//! `x_scaled = (x - center) / scale` and its inverse are exact.

use super::traits::Transformer;
use crate::error::{ForecastError, Result};

/// Fitted center and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParams {
    pub center: f64,
    pub scale: f64,
}

impl ScaleParams {
    fn apply(&self, values: &[f64]) -> Vec<f64> {
        values
            .iter()
            .map(|&x| (x - self.center) / self.scale)
            .collect()
    }

    fn invert(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&x| x * self.scale + self.center).collect()
    }
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

fn not_fitted(name: &str) -> ForecastError {
    ForecastError::InvalidParameter(format!("{} must be fitted before use", name))
}

/// Zero mean, unit variance scaling (population standard deviation).
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    params: Option<ScaleParams>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> Option<ScaleParams> {
        self.params
    }
}

impl Transformer for StandardScaler {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let data = finite(values);
        if data.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        self.params = Some(ScaleParams {
            center: mean,
            scale: if std < 1e-10 { 1.0 } else { std },
        });
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let params = self.params.ok_or_else(|| not_fitted(self.name()))?;
        Ok(params.apply(values))
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let params = self.params.ok_or_else(|| not_fitted(self.name()))?;
        Ok(params.invert(values))
    }

    fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    fn name(&self) -> &str {
        "StandardScaler"
    }

    fn box_clone(&self) -> Box<dyn Transformer> {
        Box::new(self.clone())
    }
}

/// Scale to the `[0, 1]` range seen during fit.
#[derive(Debug, Clone, Default)]
pub struct MinMaxScaler {
    params: Option<ScaleParams>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> Option<ScaleParams> {
        self.params
    }
}

impl Transformer for MinMaxScaler {
    fn fit(&mut self, values: &[f64]) -> Result<()> {
        let data = finite(values);
        if data.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        self.params = Some(ScaleParams {
            center: min,
            scale: if range < 1e-10 { 1.0 } else { range },
        });
        Ok(())
    }

    fn transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let params = self.params.ok_or_else(|| not_fitted(self.name()))?;
        Ok(params.apply(values))
    }

    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>> {
        let params = self.params.ok_or_else(|| not_fitted(self.name()))?;
        Ok(params.invert(values))
    }

    fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    fn name(&self) -> &str {
        "MinMaxScaler"
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
    fn standard_scaler_basic() {
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let params = scaler.params().unwrap();
        assert_relative_eq!(params.center, 3.0, epsilon = 1e-10);
        assert_relative_eq!(params.scale, 2.0_f64.sqrt(), epsilon = 1e-10);
        let mean: f64 = scaled.iter().sum::<f64>() / scaled.len() as f64;
        assert_relative_eq!(mean, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn standard_scaler_constant_uses_unit_scale() {
        let mut scaler = StandardScaler::new();
        let scaled = scaler.fit_transform(&[5.0; 10]).unwrap();
        assert_relative_eq!(scaler.params().unwrap().scale, 1.0);
        assert!(scaled.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn standard_scaler_ignores_nan_when_fitting() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&[f64::NAN, 2.0, 4.0]).unwrap();
        assert_relative_eq!(scaler.params().unwrap().center, 3.0);
        let out = scaler.transform(&[f64::NAN, 3.0]).unwrap();
        assert!(out[0].is_nan());
        assert_relative_eq!(out[1], 0.0);
    }

    #[test]
    fn unfitted_scaler_errors() {
        let scaler = StandardScaler::new();
        assert!(scaler.transform(&[1.0]).is_err());
        assert!(!scaler.is_fitted());
    }

    #[test]
    fn min_max_inverse_recovers_values() {
        let data = vec![3.0, -1.0, 7.0, 2.5];
        let mut scaler = MinMaxScaler::new();
        let scaled = scaler.fit_transform(&data).unwrap();
        assert_relative_eq!(scaled[1], 0.0);
        assert_relative_eq!(scaled[2], 1.0);
        let back = scaler.inverse_transform(&scaled).unwrap();
        for (a, b) in data.iter().zip(back.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn boxed_clone_keeps_fitted_state() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&[1.0, 3.0]).unwrap();
        let boxed: Box<dyn Transformer> = Box::new(scaler);
        let cloned = boxed.clone();
        assert_eq!(
            boxed.transform(&[2.0]).unwrap(),
            cloned.transform(&[2.0]).unwrap()
        );
    }
}
