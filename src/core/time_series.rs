//! Univariate series and column frames used as forecaster inputs.

use super::index::SeriesIndex;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};

/// A named univariate series with its index.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    name: String,
    values: Vec<f64>,
    index: SeriesIndex,
}

impl TimeSeries {
    /// Series over the integer index `0..n`.
    pub fn new(values: Vec<f64>) -> Self {
        let index = SeriesIndex::range(values.len());
        Self {
            name: "y".to_string(),
            values,
            index,
        }
    }

    /// Series with an explicit index of the same length.
    pub fn with_index(values: Vec<f64>, index: SeriesIndex) -> Result<Self> {
        if values.len() != index.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: index.len(),
                got: values.len(),
            });
        }
        Ok(Self {
            name: "y".to_string(),
            values,
            index,
        })
    }

    /// Series indexed by evenly spaced timestamps.
    pub fn from_timestamps(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        let index = SeriesIndex::from_timestamps(timestamps)?;
        Self::with_index(values, index)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn index(&self) -> &SeriesIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|v| !v.is_finite())
    }

    /// Last `n` observations.
    pub fn tail(&self, n: usize) -> TimeSeries {
        let start = self.len().saturating_sub(n);
        TimeSeries {
            name: self.name.clone(),
            values: self.values[start..].to_vec(),
            index: self.index.tail(n),
        }
    }
}

/// Several series sharing one index, stored column-major.
///
/// Used both for exogenous regressors and for the multi-series input of the
/// direct forecaster.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFrame {
    index: SeriesIndex,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl SeriesFrame {
    /// Frame from named columns over an explicit index.
    pub fn new(index: SeriesIndex, columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            if values.len() != index.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: index.len(),
                    got: values.len(),
                });
            }
            if names.contains(&name) {
                return Err(ForecastError::InvalidParameter(format!(
                    "duplicated column name `{}`",
                    name
                )));
            }
            names.push(name);
            data.push(values);
        }
        Ok(Self {
            index,
            names,
            columns: data,
        })
    }

    /// Frame over the integer index `0..n`, inferred from the first column.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>) -> Result<Self> {
        let len = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        Self::new(SeriesIndex::range(len), columns)
    }

    pub fn index(&self) -> &SeriesIndex {
        &self.index
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn column_at(&self, i: usize) -> Option<&[f64]> {
        self.columns.get(i).map(|c| c.as_slice())
    }

    /// One column as a standalone series.
    pub fn series(&self, name: &str) -> Option<TimeSeries> {
        self.column(name).map(|values| TimeSeries {
            name: name.to_string(),
            values: values.to_vec(),
            index: self.index.clone(),
        })
    }

    /// Values of all columns at row `i`.
    pub fn row(&self, i: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[i]).collect()
    }

    pub fn has_missing(&self) -> bool {
        self.columns.iter().flatten().any(|v| !v.is_finite())
    }

    /// Rows `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> SeriesFrame {
        let end = end.min(self.n_rows());
        let start = start.min(end);
        SeriesFrame {
            index: self.index.slice(start, end),
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c[start..end].to_vec()).collect(),
        }
    }

    /// Last `n` rows.
    pub fn tail(&self, n: usize) -> SeriesFrame {
        let len = self.n_rows();
        self.slice(len.saturating_sub(n), len)
    }
}
