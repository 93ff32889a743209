//! Composite estimator: feature stages followed by a terminal regressor.

use super::traits::{FeatureTransform, Regressor};
use crate::core::Matrix;
use crate::error::{ForecastError, Result};

/// Column-wise standardisation of a design matrix.
#[derive(Debug, Clone, Default)]
pub struct FeatureScaler {
    params: Option<Vec<(f64, f64)>>,
}

impl FeatureScaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureTransform for FeatureScaler {
    fn fit(&mut self, x: &Matrix) -> Result<()> {
        if x.n_rows() == 0 {
            return Err(ForecastError::EmptyData);
        }
        let n = x.n_rows() as f64;
        let params = (0..x.n_cols())
            .map(|j| {
                let col = x.column(j);
                let mean = col.iter().sum::<f64>() / n;
                let std = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                (mean, if std < 1e-10 { 1.0 } else { std })
            })
            .collect();
        self.params = Some(params);
        Ok(())
    }

    fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let params = self.params.as_ref().ok_or(ForecastError::FitRequired)?;
        if params.len() != x.n_cols() {
            return Err(ForecastError::DimensionMismatch {
                expected: params.len(),
                got: x.n_cols(),
            });
        }
        let mut out = x.clone();
        for i in 0..x.n_rows() {
            for (j, (mean, std)) in params.iter().enumerate() {
                out.set(i, j, (x.get(i, j) - mean) / std);
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "FeatureScaler"
    }

    fn box_clone(&self) -> Box<dyn FeatureTransform> {
        Box::new(self.clone())
    }
}

/// Ordered feature stages ending in a regressor.
///
/// Feature importances are those of the terminal regressor.
#[derive(Clone)]
pub struct Pipeline<R> {
    stages: Vec<Box<dyn FeatureTransform>>,
    regressor: R,
}

impl<R: Regressor> Pipeline<R> {
    pub fn new(regressor: R) -> Self {
        Self {
            stages: Vec::new(),
            regressor,
        }
    }

    pub fn with_stage<T: FeatureTransform + 'static>(mut self, stage: T) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn regressor(&self) -> &R {
        &self.regressor
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    fn apply_stages(&self, x: &Matrix) -> Result<Matrix> {
        let mut current = x.clone();
        for stage in &self.stages {
            current = stage.transform(&current)?;
        }
        Ok(current)
    }
}

impl<R: Regressor> Regressor for Pipeline<R> {
    fn fit(&mut self, x: &Matrix, y: &[f64], sample_weight: Option<&[f64]>) -> Result<()> {
        let mut current = x.clone();
        for stage in self.stages.iter_mut() {
            stage.fit(&current)?;
            current = stage.transform(&current)?;
        }
        self.regressor.fit(&current, y, sample_weight)
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let transformed = self.apply_stages(x)?;
        self.regressor.predict(&transformed)
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        self.regressor.feature_importances()
    }

    fn name(&self) -> &str {
        "Pipeline"
    }
}
