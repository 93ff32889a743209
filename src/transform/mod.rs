//! Value transformations applied around the forecasting loop.
//!
//! Provides scaling and Box-Cox transformers, the stateful differencer and
//! trailing window statistics.
//!
//! # Example
//!
//! ```
//! use autoreg_forecast::transform::{StandardScaler, TimeSeriesDifferentiator, Transformer};
//!
//! let series = vec![1.0, 2.0, 4.0, 7.0, 11.0];
//!
//! let mut scaler = StandardScaler::new();
//! let scaled = scaler.fit_transform(&series).unwrap();
//! assert_eq!(scaled.len(), series.len());
//!
//! let mut diff = TimeSeriesDifferentiator::new(1).unwrap();
//! diff.fit(&series).unwrap();
//! let next = diff.inverse_transform_next_window(&[5.0, 6.0]).unwrap();
//! assert_eq!(next, vec![16.0, 22.0]);
//! ```

pub mod boxcox;
pub mod differentiator;
pub mod scale;
pub mod traits;
pub mod window;

pub use boxcox::BoxCoxTransformer;
pub use differentiator::{difference, TimeSeriesDifferentiator};
pub use scale::{MinMaxScaler, ScaleParams, StandardScaler};
pub use traits::Transformer;
pub use window::{rolling, RollingStat};
