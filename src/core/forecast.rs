//! Forecast result structures for point, interval and ensemble predictions.

use super::index::IndexLabel;
use crate::error::{ForecastError, Result};

/// Point predictions with optional interval bounds, one entry per step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    index: Vec<IndexLabel>,
    point: Vec<f64>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
}

impl Forecast {
    /// Create a forecast from point predictions.
    pub fn from_values(index: Vec<IndexLabel>, values: Vec<f64>) -> Result<Self> {
        if index.len() != values.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: index.len(),
                got: values.len(),
            });
        }
        Ok(Self {
            index,
            point: values,
            lower: None,
            upper: None,
        })
    }

    /// Create a forecast with prediction intervals.
    pub fn from_values_with_intervals(
        index: Vec<IndexLabel>,
        values: Vec<f64>,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> Result<Self> {
        let mut forecast = Self::from_values(index, values)?;
        for bound in [&lower, &upper] {
            if bound.len() != forecast.point.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: forecast.point.len(),
                    got: bound.len(),
                });
            }
        }
        forecast.lower = Some(lower);
        forecast.upper = Some(upper);
        Ok(forecast)
    }

    /// Get the forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }

    pub fn index(&self) -> &[IndexLabel] {
        &self.index
    }

    pub fn point(&self) -> &[f64] {
        &self.point
    }

    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }

    pub fn has_intervals(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }
}

/// Named columns of values, one row per forecast step.
///
/// Holds bootstrap ensembles (`pred_boot_{i}`), quantiles (`q_{q}`) and
/// fitted distribution parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastTable {
    index: Vec<IndexLabel>,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl ForecastTable {
    pub fn new(index: Vec<IndexLabel>, columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if index.len() != rows.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: index.len(),
                got: rows.len(),
            });
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(ForecastError::DimensionMismatch {
                expected: columns.len(),
                got: bad.len(),
            });
        }
        Ok(Self {
            index,
            columns,
            rows,
        })
    }

    pub fn index(&self) -> &[IndexLabel] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn row(&self, step: usize) -> &[f64] {
        &self.rows[step]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[j]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(n: i64) -> Vec<IndexLabel> {
        (0..n).map(IndexLabel::Position).collect()
    }

    #[test]
    fn forecast_with_intervals() {
        let f = Forecast::from_values_with_intervals(
            idx(2),
            vec![1.0, 2.0],
            vec![0.5, 1.5],
            vec![1.5, 2.5],
        )
        .unwrap();
        assert_eq!(f.horizon(), 2);
        assert!(f.has_intervals());
        assert_eq!(f.lower(), Some(&[0.5, 1.5][..]));
    }

    #[test]
    fn forecast_rejects_mismatched_bounds() {
        let f = Forecast::from_values_with_intervals(idx(2), vec![1.0, 2.0], vec![0.5], vec![1.5, 2.5]);
        assert!(f.is_err());
    }

    #[test]
    fn table_column_lookup() {
        let t = ForecastTable::new(
            idx(2),
            vec!["q_0.1".to_string(), "q_0.9".to_string()],
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        )
        .unwrap();
        assert_eq!(t.column("q_0.9"), Some(vec![2.0, 4.0]));
        assert_eq!(t.column("missing"), None);
    }
}
