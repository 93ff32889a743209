//! Regression estimators driven by the forecasters.

mod linear;
mod pipeline;
mod traits;

pub use linear::LinearRegression;
pub use pipeline::{FeatureScaler, Pipeline};
pub use traits::{FeatureTransform, Regressor};
