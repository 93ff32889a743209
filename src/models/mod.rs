//! Autoregressive forecasters.
//!
//! [`RecursiveForecaster`] trains a single one-step estimator and feeds its
//! own predictions back as lags. [`DirectForecaster`] trains one estimator
//! per horizon over several input series.

mod common;
mod direct;
mod recursive;

pub use common::{
    FitOptions, PredictMatrix, TrainingInfo, TrainingMatrix, WeightFn, DEFAULT_INTERVAL,
    DEFAULT_QUANTILES,
};
pub use direct::{DirectForecaster, DirectForecasterBuilder, DirectTrainingMatrix, SeriesLags};
pub use recursive::{RecursiveForecaster, RecursiveForecasterBuilder};
