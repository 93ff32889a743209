//! Error types for the autoreg-forecast library.

use thiserror::Error;

/// Result type alias for forecast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while building, fitting or querying a forecaster.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Lags must be a non-empty set of positive integers.
    #[error("invalid lags: {0}")]
    InvalidLags(String),

    /// Differencing order must be at least 1.
    #[error("invalid differentiation order: {0}, must be an integer greater than 0")]
    InvalidDifferentiation(usize),

    /// Horizon configuration or requested steps are invalid.
    #[error("invalid steps: {0}")]
    InvalidSteps(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Two indices that must line up do not.
    #[error("index mismatch: {0}")]
    IndexMismatch(String),

    /// Interval, percentile or quantile values out of bounds.
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    /// The weight function produced unusable weights.
    #[error("invalid sample weights: {0}")]
    InvalidSampleWeight(String),

    /// Missing values detected when not allowed.
    #[error("missing values detected in {0}")]
    MissingValues(String),

    /// Model has not been fitted yet.
    #[error("model must be fitted before prediction")]
    FitRequired,

    /// Residuals needed for bootstrapping are not available.
    #[error("residuals unavailable: {0}")]
    ResidualsUnavailable(String),

    /// Timestamp-related error.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// Frequency inference failed.
    #[error("could not infer frequency: {0}")]
    FrequencyInference(String),

    /// Index out of bounds.
    #[error("index out of bounds: {index} (size: {size})")]
    IndexOutOfBounds { index: usize, size: usize },

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ForecastError::EmptyData;
        assert_eq!(err.to_string(), "empty input data");

        let err = ForecastError::InsufficientData { needed: 10, got: 5 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 10, got 5"
        );

        let err = ForecastError::InvalidLags("lags must be greater than 0".to_string());
        assert_eq!(err.to_string(), "invalid lags: lags must be greater than 0");

        let err = ForecastError::InvalidDifferentiation(0);
        assert_eq!(
            err.to_string(),
            "invalid differentiation order: 0, must be an integer greater than 0"
        );

        let err = ForecastError::DimensionMismatch {
            expected: 3,
            got: 2,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 3, got 2");

        let err = ForecastError::ResidualsUnavailable("no out-of-sample residuals".to_string());
        assert_eq!(
            err.to_string(),
            "residuals unavailable: no out-of-sample residuals"
        );

        let err = ForecastError::FitRequired;
        assert_eq!(err.to_string(), "model must be fitted before prediction");
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = ForecastError::InvalidInterval("upper bound above 100".to_string());
        let err2 = err1.clone();
        assert_eq!(err1, err2);
        assert_ne!(err1, ForecastError::EmptyData);
    }
}
