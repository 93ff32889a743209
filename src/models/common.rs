//! Input validation, transformer plumbing and training metadata shared by
//! the recursive and direct forecasters.

use crate::core::{IndexKind, IndexLabel, Matrix, SeriesFrame, SeriesIndex, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::transform::Transformer;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Maps the index of the training rows to one weight per row.
pub type WeightFn = Arc<dyn Fn(&SeriesIndex) -> Vec<f64> + Send + Sync>;

/// What `fit` keeps beyond the fitted estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    /// Keep the tail of the training series for predicting without an
    /// explicit last window.
    pub store_last_window: bool,
    /// Keep training residuals for bootstrapping.
    pub store_in_sample_residuals: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            store_last_window: true,
            store_in_sample_residuals: true,
        }
    }
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_last_window(mut self) -> Self {
        self.store_last_window = false;
        self
    }

    pub fn without_in_sample_residuals(mut self) -> Self {
        self.store_in_sample_residuals = false;
        self
    }
}

/// Provenance recorded by a successful `fit`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingInfo {
    pub fit_date: DateTime<Utc>,
    /// First and last label of the training series.
    pub training_range: (IndexLabel, IndexLabel),
    pub index_kind: IndexKind,
    pub index_freq: String,
    /// Names of the exogenous columns, if any were used.
    pub exog_names: Option<Vec<String>>,
    /// Names of the design-matrix columns in training order.
    pub feature_names: Vec<String>,
}

impl TrainingInfo {
    pub(crate) fn new(
        index: &SeriesIndex,
        exog_names: Option<Vec<String>>,
        feature_names: Vec<String>,
    ) -> Result<Self> {
        let (first, last) = match (index.first(), index.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err(ForecastError::EmptyData),
        };
        Ok(Self {
            fit_date: Utc::now(),
            training_range: (first, last),
            index_kind: index.kind(),
            index_freq: index.freq_label(),
            exog_names,
            feature_names,
        })
    }
}

impl fmt::Display for TrainingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Training range: [{}, {}]",
            self.training_range.0, self.training_range.1
        )?;
        writeln!(f, "Training index type: {:?}", self.index_kind)?;
        writeln!(f, "Training index frequency: {}", self.index_freq)?;
        match &self.exog_names {
            Some(names) => writeln!(f, "Exogenous variables: {}", names.join(", "))?,
            None => writeln!(f, "Exogenous variables: None")?,
        }
        write!(f, "Fit date: {}", self.fit_date.format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Design matrix, targets and the index of the target rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingMatrix {
    pub x: Matrix,
    pub y: Vec<f64>,
    pub feature_names: Vec<String>,
    pub index: SeriesIndex,
}

/// Design matrix used at prediction time, one row per forecast step.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictMatrix {
    pub x: Matrix,
    pub feature_names: Vec<String>,
    pub index: Vec<IndexLabel>,
}

/// Percentile interval used when none is given.
pub const DEFAULT_INTERVAL: [f64; 2] = [5.0, 95.0];
/// Quantiles used when none are given.
pub const DEFAULT_QUANTILES: [f64; 3] = [0.05, 0.5, 0.95];

/// Column names of a bootstrap table.
pub(crate) fn boot_columns(n_boot: usize) -> Vec<String> {
    (0..n_boot).map(|b| format!("pred_boot_{}", b)).collect()
}

pub(crate) fn check_series(series: &TimeSeries, label: &str) -> Result<()> {
    if series.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if series.has_missing() {
        return Err(ForecastError::MissingValues(label.to_string()));
    }
    Ok(())
}

/// Exogenous frame used for training must cover exactly the target index.
pub(crate) fn check_train_exog(exog: &SeriesFrame, index: &SeriesIndex) -> Result<()> {
    if exog.n_cols() == 0 {
        return Err(ForecastError::InvalidParameter(
            "exog must have at least one column".to_string(),
        ));
    }
    if exog.n_rows() != index.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: index.len(),
            got: exog.n_rows(),
        });
    }
    if exog.index() != index {
        return Err(ForecastError::IndexMismatch(
            "exog must have the same index as the series".to_string(),
        ));
    }
    if exog.has_missing() {
        return Err(ForecastError::MissingValues("exog".to_string()));
    }
    Ok(())
}

/// Exogenous frame used for prediction: known columns, at least `rows`
/// rows, starting at the first forecast label.
pub(crate) fn check_predict_exog(
    exog: &SeriesFrame,
    names: &[String],
    rows: usize,
    first_label: Option<IndexLabel>,
) -> Result<()> {
    if let Some(missing) = names.iter().find(|n| exog.column(n).is_none()) {
        return Err(ForecastError::InvalidParameter(format!(
            "exog is missing column `{}` used in training",
            missing
        )));
    }
    if exog.n_rows() < rows {
        return Err(ForecastError::InsufficientData {
            needed: rows,
            got: exog.n_rows(),
        });
    }
    if exog.index().first() != first_label {
        return Err(ForecastError::IndexMismatch(format!(
            "exog must start at the first forecast label ({}), got {}",
            first_label.map(|l| l.to_string()).unwrap_or_default(),
            exog.index()
                .first()
                .map(|l| l.to_string())
                .unwrap_or_default()
        )));
    }
    if exog.slice(0, rows).has_missing() {
        return Err(ForecastError::MissingValues("exog".to_string()));
    }
    Ok(())
}

/// A last window must be long enough and continue the training index.
pub(crate) fn check_last_window(
    len: usize,
    index: &SeriesIndex,
    window_size_diff: usize,
    info: &TrainingInfo,
    has_missing: bool,
) -> Result<()> {
    if len < window_size_diff {
        return Err(ForecastError::InsufficientData {
            needed: window_size_diff,
            got: len,
        });
    }
    if has_missing {
        return Err(ForecastError::MissingValues("last_window".to_string()));
    }
    if index.kind() != info.index_kind || index.freq_label() != info.index_freq {
        return Err(ForecastError::IndexMismatch(format!(
            "last_window index ({:?}, {}) does not match the training index ({:?}, {})",
            index.kind(),
            index.freq_label(),
            info.index_kind,
            info.index_freq
        )));
    }
    Ok(())
}

pub(crate) fn sample_weights(
    weight_func: Option<&WeightFn>,
    index: &SeriesIndex,
) -> Result<Option<Vec<f64>>> {
    let Some(func) = weight_func else {
        return Ok(None);
    };
    let weights = func(index);
    if weights.len() != index.len() {
        return Err(ForecastError::InvalidSampleWeight(format!(
            "expected {} weights, got {}",
            index.len(),
            weights.len()
        )));
    }
    if weights.iter().any(|w| w.is_nan()) {
        return Err(ForecastError::InvalidSampleWeight(
            "weights cannot contain NaN values".to_string(),
        ));
    }
    if weights.iter().any(|w| *w < 0.0) {
        return Err(ForecastError::InvalidSampleWeight(
            "weights cannot contain negative values".to_string(),
        ));
    }
    if weights.iter().sum::<f64>() == 0.0 {
        return Err(ForecastError::InvalidSampleWeight(
            "weights cannot add up to zero".to_string(),
        ));
    }
    Ok(Some(weights))
}

/// Fit one clone of `template` per exogenous column.
pub(crate) fn fit_exog_transformers(
    template: Option<&dyn Transformer>,
    exog: &SeriesFrame,
) -> Result<Vec<Box<dyn Transformer>>> {
    let Some(template) = template else {
        return Ok(Vec::new());
    };
    exog.names()
        .iter()
        .map(|name| {
            let mut t = template.box_clone();
            t.fit(exog.column(name).unwrap_or_default())?;
            Ok(t)
        })
        .collect()
}

/// Columns `names` of `exog`, rows `start..end`, each passed through its
/// fitted transformer when there is one.
pub(crate) fn transform_exog(
    exog: &SeriesFrame,
    names: &[String],
    transformers: &[Box<dyn Transformer>],
    start: usize,
    end: usize,
) -> Result<Vec<Vec<f64>>> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let column = exog.column(name).ok_or_else(|| {
                ForecastError::InvalidParameter(format!("exog is missing column `{}`", name))
            })?;
            let column = &column[start..end];
            match transformers.get(i) {
                Some(t) => t.transform(column),
                None => Ok(column.to_vec()),
            }
        })
        .collect()
}

pub(crate) fn transform_values(
    transformer: Option<&dyn Transformer>,
    values: &[f64],
) -> Result<Vec<f64>> {
    match transformer {
        Some(t) => t.transform(values),
        None => Ok(values.to_vec()),
    }
}

pub(crate) fn inverse_transform_values(
    transformer: Option<&dyn Transformer>,
    values: Vec<f64>,
) -> Result<Vec<f64>> {
    match transformer {
        Some(t) => t.inverse_transform(&values),
        None => Ok(values),
    }
}

/// Feature importances paired with their names, optionally sorted by
/// decreasing importance.
pub(crate) fn named_importances(
    names: &[String],
    importances: Vec<f64>,
    sort: bool,
) -> Result<Vec<(String, f64)>> {
    if importances.len() != names.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: names.len(),
            got: importances.len(),
        });
    }
    let mut pairs: Vec<(String, f64)> = names.iter().cloned().zip(importances).collect();
    if sort {
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::StandardScaler;

    fn weights(f: fn(&SeriesIndex) -> Vec<f64>) -> WeightFn {
        Arc::new(f)
    }

    #[test]
    fn fit_options_defaults() {
        let o = FitOptions::default();
        assert!(o.store_last_window && o.store_in_sample_residuals);
        let o = FitOptions::new().without_last_window().without_in_sample_residuals();
        assert!(!o.store_last_window && !o.store_in_sample_residuals);
    }

    #[test]
    fn sample_weights_are_validated() {
        let index = SeriesIndex::range(3);
        assert_eq!(sample_weights(None, &index).unwrap(), None);

        let ok = weights(|idx| vec![1.0; idx.len()]);
        assert_eq!(sample_weights(Some(&ok), &index).unwrap(), Some(vec![1.0; 3]));

        let nan = weights(|_| vec![1.0, f64::NAN, 1.0]);
        let negative = weights(|_| vec![1.0, -1.0, 1.0]);
        let zero = weights(|_| vec![0.0, 0.0, 0.0]);
        let short = weights(|_| vec![1.0]);
        for bad in [nan, negative, zero, short] {
            assert!(matches!(
                sample_weights(Some(&bad), &index),
                Err(ForecastError::InvalidSampleWeight(_))
            ));
        }
    }

    #[test]
    fn train_exog_must_share_index() {
        let index = SeriesIndex::range(4);
        let exog = SeriesFrame::from_columns(vec![("x".into(), vec![1.0, 2.0, 3.0, 4.0])]).unwrap();
        assert!(check_train_exog(&exog, &index).is_ok());

        let shifted = SeriesFrame::new(
            SeriesIndex::Range {
                start: 1,
                step: 1,
                len: 4,
            },
            vec![("x".into(), vec![1.0, 2.0, 3.0, 4.0])],
        )
        .unwrap();
        assert!(matches!(
            check_train_exog(&shifted, &index),
            Err(ForecastError::IndexMismatch(_))
        ));

        let short = SeriesFrame::from_columns(vec![("x".into(), vec![1.0, 2.0])]).unwrap();
        assert!(check_train_exog(&short, &index).is_err());
    }

    #[test]
    fn predict_exog_checks_columns_rows_and_start() {
        let future = SeriesIndex::range(10).extend(3);
        let exog = SeriesFrame::new(future.clone(), vec![("x".into(), vec![1.0, 2.0, 3.0])]).unwrap();
        let names = vec!["x".to_string()];
        assert!(check_predict_exog(&exog, &names, 3, future.first()).is_ok());
        assert!(check_predict_exog(&exog, &names, 4, future.first()).is_err());
        assert!(check_predict_exog(&exog, &["z".to_string()], 3, future.first()).is_err());
        assert!(matches!(
            check_predict_exog(&exog, &names, 3, Some(IndexLabel::Position(0))),
            Err(ForecastError::IndexMismatch(_))
        ));
    }

    #[test]
    fn exog_transformers_are_fitted_per_column() {
        let exog = SeriesFrame::from_columns(vec![
            ("a".into(), vec![1.0, 2.0, 3.0]),
            ("b".into(), vec![10.0, 20.0, 30.0]),
        ])
        .unwrap();
        let template = StandardScaler::new();
        let fitted = fit_exog_transformers(Some(&template), &exog).unwrap();
        assert_eq!(fitted.len(), 2);
        let names = exog.names().to_vec();
        let cols = transform_exog(&exog, &names, &fitted, 0, 3).unwrap();
        for (a, b) in cols[0].iter().zip(&cols[1]) {
            approx::assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
        assert!(fit_exog_transformers(None, &exog).unwrap().is_empty());
    }

    #[test]
    fn importances_sorted_descending() {
        let names = vec!["a".to_string(), "b".to_string()];
        let pairs = named_importances(&names, vec![0.1, 0.9], true).unwrap();
        assert_eq!(pairs[0].0, "b");
        assert!(named_importances(&names, vec![1.0], false).is_err());
    }
}
