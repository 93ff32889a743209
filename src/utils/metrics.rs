//! Accuracy metrics for forecast evaluation.
//!
//! The scaled errors divide by the error of a one-step naive forecast on the
//! training data, so values below 1 beat the naive forecast.

use crate::error::{ForecastError, Result};

fn check_pair(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.is_empty() || predicted.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if actual.len() != predicted.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: actual.len(),
            got: predicted.len(),
        });
    }
    Ok(())
}

/// First differences of each training series, concatenated. NaNs dropped.
fn naive_errors(y_train: &[&[f64]]) -> Vec<f64> {
    y_train
        .iter()
        .flat_map(|s| s.windows(2).map(|w| w[1] - w[0]))
        .filter(|d| !d.is_nan())
        .collect()
}

/// Calculate MAE between two slices.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Calculate MSE between two slices.
pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / actual.len() as f64
}

/// Calculate RMSE between two slices.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

/// Mean absolute scaled error against a naive forecast of `y_train`.
pub fn mean_absolute_scaled_error(actual: &[f64], predicted: &[f64], y_train: &[f64]) -> Result<f64> {
    mean_absolute_scaled_error_multi(actual, predicted, &[y_train])
}

/// MASE where the naive error pools several training series.
pub fn mean_absolute_scaled_error_multi(
    actual: &[f64],
    predicted: &[f64],
    y_train: &[&[f64]],
) -> Result<f64> {
    check_pair(actual, predicted)?;
    let naive = naive_errors(y_train);
    if naive.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 2, got: 1 });
    }
    let scale = naive.iter().map(|d| d.abs()).sum::<f64>() / naive.len() as f64;
    Ok(mae(actual, predicted) / scale)
}

/// Root mean squared scaled error against a naive forecast of `y_train`.
pub fn root_mean_squared_scaled_error(
    actual: &[f64],
    predicted: &[f64],
    y_train: &[f64],
) -> Result<f64> {
    root_mean_squared_scaled_error_multi(actual, predicted, &[y_train])
}

/// RMSSE where the naive error pools several training series.
pub fn root_mean_squared_scaled_error_multi(
    actual: &[f64],
    predicted: &[f64],
    y_train: &[&[f64]],
) -> Result<f64> {
    check_pair(actual, predicted)?;
    let naive = naive_errors(y_train);
    if naive.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 2, got: 1 });
    }
    let scale = (naive.iter().map(|d| d.powi(2)).sum::<f64>() / naive.len() as f64).sqrt();
    Ok(rmse(actual, predicted) / scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn basic_errors() {
        let actual = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let predicted = vec![1.5, 2.5, 2.5, 4.5, 4.5];
        assert_relative_eq!(mae(&actual, &predicted), 0.5, epsilon = 1e-10);
        assert_relative_eq!(mse(&actual, &predicted), 0.25, epsilon = 1e-10);
        assert_relative_eq!(rmse(&actual, &predicted), 0.5, epsilon = 1e-10);
        assert!(mae(&actual, &[1.0]).is_nan());
    }

    #[test]
    fn mase_scales_by_naive_error() {
        // Naive differences: 2, 2, 2 -> scale 2.
        let y_train = [1.0, 3.0, 5.0, 7.0];
        let mase = mean_absolute_scaled_error(&[9.0, 11.0], &[10.0, 10.0], &y_train).unwrap();
        assert_relative_eq!(mase, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn rmsse_pools_multiple_series() {
        let a = [0.0, 1.0];
        let b = [0.0, 3.0];
        // Naive squared errors 1 and 9 -> scale sqrt(5).
        let rmsse =
            root_mean_squared_scaled_error_multi(&[1.0], &[1.0 + 5.0_f64.sqrt()], &[&a, &b])
                .unwrap();
        assert_relative_eq!(rmsse, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn scaled_errors_validate_inputs() {
        assert!(mean_absolute_scaled_error(&[], &[], &[1.0, 2.0]).is_err());
        assert!(mean_absolute_scaled_error(&[1.0], &[1.0, 2.0], &[1.0, 2.0]).is_err());
        assert!(root_mean_squared_scaled_error(&[1.0], &[1.0], &[1.0]).is_err());
    }
}
