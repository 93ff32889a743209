//! Regressor capability wrapped by the forecasters.

use crate::core::Matrix;
use crate::error::Result;

/// A regression estimator the forecasters drive.
///
/// `predict` is called with single-row matrices inside the recursive loop,
/// so implementations must not assume a minimum number of rows.
pub trait Regressor: Send + Sync {
    /// Fit on a design matrix, optionally weighting each row.
    fn fit(&mut self, x: &Matrix, y: &[f64], sample_weight: Option<&[f64]>) -> Result<()>;

    /// Predict one value per row of `x`.
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>>;

    /// Per-feature importances (or coefficients) if the estimator has them.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    fn name(&self) -> &str;
}

/// Feature-space stage of a [`Pipeline`](super::Pipeline).
pub trait FeatureTransform: Send + Sync {
    fn fit(&mut self, x: &Matrix) -> Result<()>;

    fn transform(&self, x: &Matrix) -> Result<Matrix>;

    fn name(&self) -> &str;

    fn box_clone(&self) -> Box<dyn FeatureTransform>;
}

impl Clone for Box<dyn FeatureTransform> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
