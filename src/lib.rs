//! # autoreg-forecast
//!
//! Autoregressive forecasting on top of arbitrary regression estimators.
//!
//! A forecaster turns a series into a supervised problem (lagged values,
//! rolling statistics and exogenous columns as predictors), trains any
//! [`estimators::Regressor`] on it, and produces multi-step forecasts
//! either recursively, feeding each prediction back as a lag, or directly,
//! with one estimator per horizon. Uncertainty comes from bootstrapping
//! stored residuals, optionally conditioned on the predicted value's bin.
//!
//! # Example
//!
//! ```
//! use autoreg_forecast::prelude::*;
//!
//! let values: Vec<f64> = (0..60).map(|i| 5.0 + (i as f64 * 0.5).sin()).collect();
//! let series = TimeSeries::new(values);
//!
//! let mut forecaster = RecursiveForecaster::builder(LinearRegression::new(), LagSpec::up_to(2).unwrap())
//!     .transformer_y(StandardScaler::new())
//!     .build()
//!     .unwrap();
//! forecaster.fit(&series, None).unwrap();
//!
//! let config = BootstrapConfig::new(100).with_seed(1);
//! let forecast = forecaster
//!     .predict_interval(5, None, None, [10.0, 90.0], &config)
//!     .unwrap();
//! assert_eq!(forecast.horizon(), 5);
//! assert!(forecast.has_intervals());
//! ```

#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_range_loop)]

pub mod core;
pub mod error;
pub mod estimators;
pub mod features;
pub mod models;
pub mod residuals;
pub mod transform;
pub mod utils;

pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::core::{Forecast, ForecastTable, IndexLabel, SeriesFrame, SeriesIndex, TimeSeries};
    pub use crate::error::{ForecastError, Result};
    pub use crate::estimators::{LinearRegression, Regressor};
    pub use crate::features::{CustomPredictors, LagSpec, RollingFeatures};
    pub use crate::models::{DirectForecaster, FitOptions, RecursiveForecaster, SeriesLags};
    pub use crate::residuals::BinnerConfig;
    pub use crate::transform::{
        BoxCoxTransformer, MinMaxScaler, RollingStat, StandardScaler, Transformer,
    };
    pub use crate::utils::{BootstrapConfig, Distribution, Exponential, Laplace, Normal, Uniform};
}
