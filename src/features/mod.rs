//! Predictor construction: lag matrices, rolling window features and
//! user-defined window predictors.
//!
//! # Example
//!
//! ```
//! use autoreg_forecast::features::{create_lags, LagSpec};
//!
//! let y = vec![1.0, 2.0, 3.0, 4.0, 5.0];
//! let (x, target) = create_lags(&y, &LagSpec::up_to(2).unwrap()).unwrap();
//!
//! assert_eq!(x.shape(), (3, 2));
//! assert_eq!(x.row(0), &[2.0, 1.0]);
//! assert_eq!(target, vec![3.0, 4.0, 5.0]);
//! ```

pub mod custom;
pub mod lags;
pub mod window_features;

pub use custom::{CustomPredictors, PredictorFn};
pub use lags::{create_direct_lags, create_lags, LagSpec};
pub use window_features::RollingFeatures;
