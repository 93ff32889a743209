//! Value transformer capability applied to target and exogenous series.

use crate::error::Result;
use std::fmt;

/// A fitted, invertible value transform.
///
/// Applied to the target before building lag matrices and inverted exactly
/// once on the final predictions. Exogenous columns each get their own
/// fitted clone.
pub trait Transformer: Send + Sync + fmt::Debug {
    /// Learn the transform parameters. Non-finite values are ignored.
    fn fit(&mut self, values: &[f64]) -> Result<()>;

    /// Apply the fitted transform.
    fn transform(&self, values: &[f64]) -> Result<Vec<f64>>;

    /// Undo the fitted transform.
    fn inverse_transform(&self, values: &[f64]) -> Result<Vec<f64>>;

    fn fit_transform(&mut self, values: &[f64]) -> Result<Vec<f64>> {
        self.fit(values)?;
        self.transform(values)
    }

    fn is_fitted(&self) -> bool;

    fn name(&self) -> &str;

    /// Clone into a new box, keeping any fitted state.
    fn box_clone(&self) -> Box<dyn Transformer>;
}

impl Clone for Box<dyn Transformer> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
