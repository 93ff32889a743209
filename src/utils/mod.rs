//! Utility functions for bootstrapping, interval estimation and evaluation.

pub mod bootstrap;
pub mod distributions;
pub mod intervals;
pub mod metrics;
pub mod stats;

pub use bootstrap::{
    BinnedDraw, BootstrapConfig, BootstrapSampler, FlatDraw, NoResiduals, ResidualDraw,
    ResidualSource,
};
pub use distributions::{Distribution, Exponential, Laplace, Normal, Uniform};
pub use intervals::{check_interval, check_quantiles, IntervalEstimator};
pub use metrics::{
    mae, mean_absolute_scaled_error, mean_absolute_scaled_error_multi, mse, rmse,
    root_mean_squared_scaled_error, root_mean_squared_scaled_error_multi,
};
