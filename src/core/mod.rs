//! Core data structures for autoregressive forecasting.

mod forecast;
mod index;
mod matrix;
mod time_series;

pub use forecast::{Forecast, ForecastTable};
pub use index::{IndexKind, IndexLabel, SeriesIndex};
pub use matrix::Matrix;
pub use time_series::{SeriesFrame, TimeSeries};
