//! Direct multi-series forecaster.
//!
//! One estimator is trained per horizon `1..=steps`. Every estimator reads
//! the same predictor row, built from the lags and rolling statistics of
//! all input series at the end of the window, plus the exogenous values of
//! its own horizon. Only the `level` series is forecast.
//!
//! Because horizons never feed each other, any subset of them can be
//! predicted, and the per-horizon models are trained in parallel.
//!
//! # Example
//!
//! ```
//! use autoreg_forecast::prelude::*;
//!
//! let a: Vec<f64> = (0..50).map(|i| (i as f64 * 0.3).sin()).collect();
//! let b: Vec<f64> = (0..50).map(|i| (i as f64 * 0.3).cos()).collect();
//! let series = SeriesFrame::from_columns(vec![("a".into(), a), ("b".into(), b)]).unwrap();
//!
//! let mut forecaster = DirectForecaster::builder(LinearRegression::new(), "a", 3)
//!     .lags(LagSpec::up_to(2).unwrap())
//!     .build()
//!     .unwrap();
//! forecaster.fit(&series, None).unwrap();
//!
//! let forecast = forecaster.predict(Some(&[1, 3]), None, None).unwrap();
//! assert_eq!(forecast.horizon(), 2);
//! ```

use super::common::{
    boot_columns, check_last_window, check_predict_exog, check_train_exog,
    fit_exog_transformers, inverse_transform_values, named_importances, sample_weights,
    transform_exog, transform_values, FitOptions, PredictMatrix, TrainingInfo, TrainingMatrix,
    WeightFn,
};
use crate::core::{Forecast, ForecastTable, IndexLabel, Matrix, SeriesFrame, SeriesIndex};
use crate::error::{ForecastError, Result};
use crate::estimators::Regressor;
use crate::features::{create_direct_lags, LagSpec, RollingFeatures};
use crate::residuals::{StepResiduals, IN_SAMPLE_STEP_SEED};
use crate::transform::{StandardScaler, TimeSeriesDifferentiator, Transformer};
use crate::utils::{
    check_interval, check_quantiles, BootstrapConfig, BootstrapSampler, Distribution,
    IntervalEstimator,
};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lags of the input series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesLags {
    /// The same lags for every series.
    Uniform(LagSpec),
    /// Lags per series name. Every series must have an entry; `None`
    /// means the series contributes no lag columns.
    PerSeries(BTreeMap<String, Option<LagSpec>>),
}

impl SeriesLags {
    pub fn max_lag(&self) -> usize {
        match self {
            SeriesLags::Uniform(l) => l.max_lag(),
            SeriesLags::PerSeries(map) => map
                .values()
                .flatten()
                .map(LagSpec::max_lag)
                .max()
                .unwrap_or(0),
        }
    }

    /// Lags of every series in `names`, in that order.
    fn resolve(&self, names: &[String]) -> Result<Vec<Option<LagSpec>>> {
        match self {
            SeriesLags::Uniform(l) => Ok(vec![Some(l.clone()); names.len()]),
            SeriesLags::PerSeries(map) => {
                if let Some(unknown) = map.keys().find(|k| !names.contains(k)) {
                    return Err(ForecastError::InvalidLags(format!(
                        "lags given for `{}`, which is not a column of series",
                        unknown
                    )));
                }
                names
                    .iter()
                    .map(|n| {
                        map.get(n).cloned().ok_or_else(|| {
                            ForecastError::InvalidLags(format!("no lags given for series `{}`", n))
                        })
                    })
                    .collect()
            }
        }
    }
}

fn check_n_jobs(n_jobs: Option<usize>) -> Result<()> {
    if n_jobs == Some(0) {
        return Err(ForecastError::InvalidParameter(
            "n_jobs must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

/// Design matrix of every horizon at once.
///
/// Columns are the lag and window features of all series followed by one
/// block of exogenous columns per horizon; `y` has one column per horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectTrainingMatrix {
    pub x: Matrix,
    pub y: Matrix,
    pub feature_names: Vec<String>,
    pub index: SeriesIndex,
    /// Number of lag and window columns before the exogenous blocks.
    pub n_autoreg: usize,
    /// Exogenous column names, without the horizon suffix.
    pub exog_names: Vec<String>,
}

struct DirectTrainingData {
    matrix: DirectTrainingMatrix,
    transformers_series: Vec<Option<Box<dyn Transformer>>>,
    transformer_exog: Vec<Box<dyn Transformer>>,
    exog_names: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
struct DirectFittedState<R> {
    regressors: BTreeMap<usize, R>,
    series_names: Vec<String>,
    transformers_series: Vec<Option<Box<dyn Transformer>>>,
    transformer_exog: Vec<Box<dyn Transformer>>,
    last_window: Option<SeriesFrame>,
    in_sample: StepResiduals,
    step_feature_names: Vec<String>,
    info: TrainingInfo,
}

impl<R> DirectFittedState<R> {
    fn level_position(&self, level: &str) -> Result<usize> {
        self.series_names
            .iter()
            .position(|n| n == level)
            .ok_or_else(|| {
                ForecastError::InvalidParameter(format!("level `{}` was not seen in training", level))
            })
    }
}

struct DirectContext<'a, R> {
    state: &'a DirectFittedState<R>,
    steps: Vec<usize>,
    rows: Vec<Vec<f64>>,
    labels: Vec<IndexLabel>,
    differentiator: Option<TimeSeriesDifferentiator>,
    level_pos: usize,
}

/// Forecaster with one estimator per horizon over several input series.
pub struct DirectForecaster<R> {
    regressor: R,
    level: String,
    steps: usize,
    lags: Option<SeriesLags>,
    window_features: Option<RollingFeatures>,
    max_lag: usize,
    window_size: usize,
    differentiation: Option<usize>,
    window_size_diff: usize,
    transformer_series: Option<Box<dyn Transformer>>,
    transformer_exog: Option<Box<dyn Transformer>>,
    weight_func: Option<WeightFn>,
    n_jobs: Option<usize>,
    forecaster_id: Option<String>,
    creation_date: DateTime<Utc>,
    fitted: Option<DirectFittedState<R>>,
    out_sample: StepResiduals,
}

/// Builder for [`DirectForecaster`].
pub struct DirectForecasterBuilder<R> {
    regressor: R,
    level: String,
    steps: usize,
    lags: Option<SeriesLags>,
    window_features: Option<RollingFeatures>,
    differentiation: Option<usize>,
    transformer_series: Option<Box<dyn Transformer>>,
    transformer_exog: Option<Box<dyn Transformer>>,
    weight_func: Option<WeightFn>,
    n_jobs: Option<usize>,
    forecaster_id: Option<String>,
}

impl<R: Regressor + Clone> DirectForecasterBuilder<R> {
    /// Same lags for every series.
    pub fn lags(mut self, lags: LagSpec) -> Self {
        self.lags = Some(SeriesLags::Uniform(lags));
        self
    }

    /// Lags per series name.
    pub fn lags_per_series(mut self, lags: BTreeMap<String, Option<LagSpec>>) -> Self {
        self.lags = Some(SeriesLags::PerSeries(lags));
        self
    }

    /// Rolling statistics computed on every series.
    pub fn window_features(mut self, features: RollingFeatures) -> Self {
        self.window_features = Some(features);
        self
    }

    /// Transform fitted independently on every series. Defaults to a
    /// [`StandardScaler`].
    pub fn transformer_series<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.transformer_series = Some(Box::new(transformer));
        self
    }

    /// Train on the raw series values.
    pub fn without_transformer_series(mut self) -> Self {
        self.transformer_series = None;
        self
    }

    pub fn transformer_exog<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.transformer_exog = Some(Box::new(transformer));
        self
    }

    pub fn weight_func<F>(mut self, func: F) -> Self
    where
        F: Fn(&SeriesIndex) -> Vec<f64> + Send + Sync + 'static,
    {
        self.weight_func = Some(Arc::new(func));
        self
    }

    pub fn differentiation(mut self, order: usize) -> Self {
        self.differentiation = Some(order);
        self
    }

    /// Worker threads used to fit the per-horizon models.
    pub fn n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    pub fn forecaster_id(mut self, id: impl Into<String>) -> Self {
        self.forecaster_id = Some(id.into());
        self
    }

    pub fn build(self) -> Result<DirectForecaster<R>> {
        if self.steps == 0 {
            return Err(ForecastError::InvalidSteps(
                "steps must be an integer greater than or equal to 1".to_string(),
            ));
        }
        if let Some(order) = self.differentiation {
            TimeSeriesDifferentiator::new(order)?;
        }
        check_n_jobs(self.n_jobs)?;
        let mut forecaster = DirectForecaster {
            regressor: self.regressor,
            level: self.level,
            steps: self.steps,
            lags: self.lags,
            window_features: self.window_features,
            max_lag: 0,
            window_size: 0,
            differentiation: self.differentiation,
            window_size_diff: 0,
            transformer_series: self.transformer_series,
            transformer_exog: self.transformer_exog,
            weight_func: self.weight_func,
            n_jobs: self.n_jobs,
            forecaster_id: self.forecaster_id,
            creation_date: Utc::now(),
            fitted: None,
            out_sample: StepResiduals::new(),
        };
        forecaster.update_window_sizes()?;
        Ok(forecaster)
    }
}

impl<R: Regressor + Clone> DirectForecaster<R> {
    pub fn builder(regressor: R, level: impl Into<String>, steps: usize) -> DirectForecasterBuilder<R> {
        DirectForecasterBuilder {
            regressor,
            level: level.into(),
            steps,
            lags: None,
            window_features: None,
            differentiation: None,
            transformer_series: Some(Box::new(StandardScaler::new())),
            transformer_exog: None,
            weight_func: None,
            n_jobs: None,
            forecaster_id: None,
        }
    }

    fn update_window_sizes(&mut self) -> Result<()> {
        let max_lag = self.lags.as_ref().map_or(0, SeriesLags::max_lag);
        let max_window = self
            .window_features
            .as_ref()
            .map_or(0, RollingFeatures::max_window);
        if max_lag == 0 && max_window == 0 {
            return Err(ForecastError::InvalidLags(
                "at least one of lags or window features must be specified".to_string(),
            ));
        }
        self.max_lag = max_lag;
        self.window_size = max_lag.max(max_window);
        self.window_size_diff = self.window_size + self.differentiation.unwrap_or(0);
        Ok(())
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    /// Number of horizons, one estimator each.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn lags(&self) -> Option<&SeriesLags> {
        self.lags.as_ref()
    }

    pub fn window_features(&self) -> Option<&RollingFeatures> {
        self.window_features.as_ref()
    }

    pub fn max_lag(&self) -> usize {
        self.max_lag
    }

    /// Observations needed to build one row: `max(max_lag, max_window)`.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn window_size_diff(&self) -> usize {
        self.window_size_diff
    }

    pub fn differentiation(&self) -> Option<usize> {
        self.differentiation
    }

    pub fn n_jobs(&self) -> Option<usize> {
        self.n_jobs
    }

    pub fn forecaster_id(&self) -> Option<&str> {
        self.forecaster_id.as_deref()
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fitted estimator of one horizon.
    pub fn regressor(&self, step: usize) -> Option<&R> {
        self.fitted.as_ref().and_then(|s| s.regressors.get(&step))
    }

    pub fn series_names(&self) -> Option<&[String]> {
        self.fitted.as_ref().map(|s| s.series_names.as_slice())
    }

    pub fn training_info(&self) -> Option<&TrainingInfo> {
        self.fitted.as_ref().map(|s| &s.info)
    }

    pub fn last_window(&self) -> Option<&SeriesFrame> {
        self.fitted.as_ref().and_then(|s| s.last_window.as_ref())
    }

    pub fn in_sample_residuals(&self) -> Option<&StepResiduals> {
        self.fitted
            .as_ref()
            .map(|s| &s.in_sample)
            .filter(|r| !r.is_empty())
    }

    pub fn out_sample_residuals(&self) -> Option<&StepResiduals> {
        Some(&self.out_sample).filter(|r| !r.is_empty())
    }

    /// Replace the lags. The forecaster must be refitted.
    pub fn set_lags(&mut self, lags: Option<SeriesLags>) -> Result<()> {
        let previous = std::mem::replace(&mut self.lags, lags);
        if let Err(e) = self.update_window_sizes() {
            self.lags = previous;
            return Err(e);
        }
        self.fitted = None;
        Ok(())
    }

    /// Replace the window features. The forecaster must be refitted.
    pub fn set_window_features(&mut self, features: Option<RollingFeatures>) -> Result<()> {
        let previous = std::mem::replace(&mut self.window_features, features);
        if let Err(e) = self.update_window_sizes() {
            self.window_features = previous;
            return Err(e);
        }
        self.fitted = None;
        Ok(())
    }

    /// Replace the estimator. The forecaster must be refitted.
    pub fn set_params(&mut self, regressor: R) {
        self.regressor = regressor;
        self.fitted = None;
    }

    /// Worker threads for fitting; `None` uses the global rayon pool.
    pub fn set_n_jobs(&mut self, n_jobs: Option<usize>) -> Result<()> {
        check_n_jobs(n_jobs)?;
        self.n_jobs = n_jobs;
        Ok(())
    }

    fn build_training(
        &self,
        series: &SeriesFrame,
        exog: Option<&SeriesFrame>,
    ) -> Result<DirectTrainingData> {
        if series.n_rows() == 0 || series.n_cols() == 0 {
            return Err(ForecastError::EmptyData);
        }
        if series.column(&self.level).is_none() {
            return Err(ForecastError::InvalidParameter(format!(
                "level `{}` is not a column of series",
                self.level
            )));
        }
        if series.has_missing() {
            return Err(ForecastError::MissingValues("series".to_string()));
        }
        let n = series.n_rows();
        if n < self.window_size_diff + self.steps {
            return Err(ForecastError::InsufficientData {
                needed: self.window_size_diff + self.steps,
                got: n,
            });
        }
        if let Some(e) = exog {
            check_train_exog(e, series.index())?;
        }

        let names = series.names();
        let layout = match &self.lags {
            Some(l) => l.resolve(names)?,
            None => vec![None; names.len()],
        };
        let n_rows = n - self.window_size_diff - (self.steps - 1);

        let mut x = Matrix::zeros(n_rows, 0);
        let mut feature_names = Vec::new();
        let mut transformers_series = Vec::with_capacity(names.len());
        let mut targets = None;

        for (name, lags) in names.iter().zip(&layout) {
            let raw = series.column(name).unwrap_or_default();
            let transformer = match &self.transformer_series {
                Some(t) => {
                    let mut t = t.clone();
                    t.fit(raw)?;
                    Some(t)
                }
                None => None,
            };
            let values = transform_values(transformer.as_deref(), raw)?;
            let values = match self.differentiation {
                Some(order) => TimeSeriesDifferentiator::new(order)?.fit_transform(&values)?,
                None => values,
            };

            let (x_lags, y_steps) =
                create_direct_lags(&values, lags.as_ref(), self.window_size_diff, self.steps)?;
            if let Some(l) = lags {
                feature_names.extend(l.names(&format!("{}_", name)));
                x = x.hstack(&x_lags)?;
            }
            if let Some(wf) = &self.window_features {
                let x_window = wf.transform_batch(&values, self.window_size_diff, n_rows)?;
                feature_names.extend(
                    wf.feature_names()
                        .into_iter()
                        .map(|f| format!("{}_{}", name, f)),
                );
                x = x.hstack(&x_window)?;
            }
            if *name == self.level {
                targets = Some(y_steps);
            }
            transformers_series.push(transformer);
        }
        let n_autoreg = x.n_cols();
        if n_autoreg == 0 {
            return Err(ForecastError::InvalidLags(
                "no series contributes lag or window features".to_string(),
            ));
        }

        let (transformer_exog, exog_names) = match exog {
            Some(e) => {
                let exog_names = e.names().to_vec();
                let transformers = fit_exog_transformers(self.transformer_exog.as_deref(), e)?;
                for step in 1..=self.steps {
                    let start = self.window_size_diff + step - 1;
                    let columns =
                        transform_exog(e, &exog_names, &transformers, start, start + n_rows)?;
                    x = x.hstack(&Matrix::from_columns(n_rows, &columns)?)?;
                    feature_names.extend(
                        exog_names
                            .iter()
                            .map(|c| format!("{}_step_{}", c, step)),
                    );
                }
                (transformers, Some(exog_names))
            }
            None => (Vec::new(), None),
        };

        let y = targets.ok_or_else(|| {
            ForecastError::InvalidParameter(format!("level `{}` produced no targets", self.level))
        })?;
        let index = series
            .index()
            .slice(self.window_size_diff, self.window_size_diff + n_rows);

        Ok(DirectTrainingData {
            matrix: DirectTrainingMatrix {
                x,
                y,
                feature_names,
                index,
                n_autoreg,
                exog_names: exog_names.clone().unwrap_or_default(),
            },
            transformers_series,
            transformer_exog,
            exog_names,
        })
    }

    /// Training matrices of every horizon at once.
    ///
    /// The matrix has `n - window_size_diff - (steps - 1)` rows.
    pub fn create_train_x_y(
        &self,
        series: &SeriesFrame,
        exog: Option<&SeriesFrame>,
    ) -> Result<DirectTrainingMatrix> {
        Ok(self.build_training(series, exog)?.matrix)
    }

    /// Columns and target of a single horizon: the lag and window columns,
    /// that horizon's exogenous block, and its target column.
    pub fn filter_train_x_y_for_step(
        &self,
        step: usize,
        train: &DirectTrainingMatrix,
    ) -> Result<TrainingMatrix> {
        self.check_step(step)?;
        let n_exog = train.exog_names.len();
        let exog_start = train.n_autoreg + (step - 1) * n_exog;
        let columns: Vec<usize> = (0..train.n_autoreg)
            .chain(exog_start..exog_start + n_exog)
            .collect();
        if columns.iter().any(|&c| c >= train.x.n_cols()) || step > train.y.n_cols() {
            return Err(ForecastError::DimensionMismatch {
                expected: train.n_autoreg + self.steps * n_exog,
                got: train.x.n_cols(),
            });
        }
        let mut feature_names: Vec<String> = train.feature_names[..train.n_autoreg].to_vec();
        feature_names.extend(train.exog_names.iter().cloned());
        Ok(TrainingMatrix {
            x: train.x.select_columns(&columns),
            y: train.y.column(step - 1),
            feature_names,
            index: train.index.clone(),
        })
    }

    fn check_step(&self, step: usize) -> Result<()> {
        if step == 0 || step > self.steps {
            return Err(ForecastError::InvalidSteps(format!(
                "step must be in the range 1..={}, got {}",
                self.steps, step
            )));
        }
        Ok(())
    }

    /// Fit storing the last window and in-sample residuals.
    pub fn fit(&mut self, series: &SeriesFrame, exog: Option<&SeriesFrame>) -> Result<()> {
        self.fit_with_options(series, exog, FitOptions::default())
    }

    /// Fit one estimator per horizon on `series` (and `exog`).
    ///
    /// Previous fitted state is discarded first; out-of-sample residuals
    /// are kept.
    pub fn fit_with_options(
        &mut self,
        series: &SeriesFrame,
        exog: Option<&SeriesFrame>,
        options: FitOptions,
    ) -> Result<()> {
        self.fitted = None;

        let data = self.build_training(series, exog)?;
        let weights = sample_weights(self.weight_func.as_ref(), &data.matrix.index)?;

        let fit_step = |step: usize| -> Result<(usize, R, Vec<f64>)> {
            let train = self.filter_train_x_y_for_step(step, &data.matrix)?;
            let mut regressor = self.regressor.clone();
            regressor.fit(&train.x, &train.y, weights.as_deref())?;
            let fitted = regressor.predict(&train.x)?;
            let residuals = train
                .y
                .iter()
                .zip(&fitted)
                .map(|(actual, pred)| actual - pred)
                .collect();
            Ok((step, regressor, residuals))
        };

        let fitted_steps: Vec<(usize, R, Vec<f64>)> = match self.n_jobs {
            Some(n_jobs) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n_jobs)
                    .build()
                    .map_err(|e| ForecastError::ComputationError(e.to_string()))?;
                pool.install(|| {
                    (1..=self.steps)
                        .into_par_iter()
                        .map(&fit_step)
                        .collect::<Result<Vec<_>>>()
                })?
            }
            None => (1..=self.steps)
                .into_par_iter()
                .map(&fit_step)
                .collect::<Result<Vec<_>>>()?,
        };

        let mut regressors = BTreeMap::new();
        let mut in_sample = StepResiduals::new();
        for (step, regressor, residuals) in fitted_steps {
            if options.store_in_sample_residuals {
                in_sample.insert(step, &residuals, IN_SAMPLE_STEP_SEED);
            }
            regressors.insert(step, regressor);
        }

        let step_feature_names = {
            let m = &data.matrix;
            let mut names = m.feature_names[..m.n_autoreg].to_vec();
            names.extend(m.exog_names.iter().cloned());
            names
        };
        let info = TrainingInfo::new(
            series.index(),
            data.exog_names,
            data.matrix.feature_names,
        )?;

        info!(
            regressor = self.regressor.name(),
            level = %self.level,
            steps = self.steps,
            series = series.n_cols(),
            rows = data.matrix.x.n_rows(),
            "fitted direct forecaster"
        );

        self.fitted = Some(DirectFittedState {
            regressors,
            series_names: series.names().to_vec(),
            transformers_series: data.transformers_series,
            transformer_exog: data.transformer_exog,
            last_window: options
                .store_last_window
                .then(|| series.tail(self.window_size_diff)),
            in_sample,
            step_feature_names,
            info,
        });
        Ok(())
    }

    /// Requested horizons, defaulting to all of them in order.
    fn resolve_steps(&self, steps: Option<&[usize]>) -> Result<Vec<usize>> {
        let steps: Vec<usize> = match steps {
            Some(s) => s.to_vec(),
            None => (1..=self.steps).collect(),
        };
        if steps.is_empty() {
            return Err(ForecastError::InvalidSteps(
                "at least one step must be requested".to_string(),
            ));
        }
        for (i, &s) in steps.iter().enumerate() {
            self.check_step(s)?;
            if steps[..i].contains(&s) {
                return Err(ForecastError::InvalidSteps(format!(
                    "step {} is requested more than once",
                    s
                )));
            }
        }
        if self.differentiation.is_some() && steps.iter().enumerate().any(|(i, &s)| s != i + 1) {
            return Err(ForecastError::InvalidSteps(format!(
                "with differentiation the requested steps must be 1..=k in order, got {:?}",
                steps
            )));
        }
        Ok(steps)
    }

    fn prepare(
        &self,
        steps: Option<&[usize]>,
        last_window: Option<&SeriesFrame>,
        exog: Option<&SeriesFrame>,
    ) -> Result<DirectContext<'_, R>> {
        let state = self.fitted.as_ref().ok_or(ForecastError::FitRequired)?;
        let steps = self.resolve_steps(steps)?;
        let window = last_window.or(state.last_window.as_ref()).ok_or_else(|| {
            ForecastError::InvalidParameter(
                "last_window must be provided when the forecaster was fitted without \
                 storing it"
                    .to_string(),
            )
        })?;
        if let Some(missing) = state
            .series_names
            .iter()
            .find(|n| window.column(n).is_none())
        {
            return Err(ForecastError::InvalidParameter(format!(
                "last_window is missing series `{}`",
                missing
            )));
        }
        check_last_window(
            window.n_rows(),
            window.index(),
            self.window_size_diff,
            &state.info,
            window.has_missing(),
        )?;
        let window = window.tail(self.window_size_diff);

        let max_step = steps.iter().copied().max().unwrap_or(1);
        let future = window.index().extend(max_step);
        let labels = steps
            .iter()
            .map(|&s| future.label(s - 1))
            .collect::<Option<Vec<_>>>()
            .ok_or(ForecastError::IndexOutOfBounds {
                index: max_step,
                size: future.len(),
            })?;

        let layout = match &self.lags {
            Some(l) => l.resolve(&state.series_names)?,
            None => vec![None; state.series_names.len()],
        };
        let level_pos = state.level_position(&self.level)?;
        let mut autoreg = Vec::new();
        let mut differentiator = None;
        for (pos, ((name, lags), transformer)) in state
            .series_names
            .iter()
            .zip(&layout)
            .zip(&state.transformers_series)
            .enumerate()
        {
            let raw = window.column(name).unwrap_or_default();
            let values = transform_values(transformer.as_deref(), raw)?;
            let values = match self.differentiation {
                Some(order) => {
                    let mut d = TimeSeriesDifferentiator::new(order)?;
                    let diffed = d.fit_transform(&values)?;
                    if pos == level_pos {
                        differentiator = Some(d);
                    }
                    diffed
                }
                None => values,
            };
            if let Some(l) = lags {
                autoreg.extend(l.row_from_window(&values)?);
            }
            if let Some(wf) = &self.window_features {
                autoreg.extend(wf.transform(&values)?);
            }
        }

        let exog_columns = match (&state.info.exog_names, exog) {
            (Some(names), Some(e)) => {
                check_predict_exog(e, names, max_step, future.first())?;
                Some(transform_exog(e, names, &state.transformer_exog, 0, max_step)?)
            }
            (Some(_), None) => {
                return Err(ForecastError::InvalidParameter(
                    "forecaster was trained with exogenous variables, exog must be provided"
                        .to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(ForecastError::InvalidParameter(
                    "forecaster was trained without exogenous variables, exog must be None"
                        .to_string(),
                ))
            }
            (None, None) => None,
        };

        let rows = steps
            .iter()
            .map(|&s| {
                let mut row = autoreg.clone();
                if let Some(columns) = &exog_columns {
                    row.extend(columns.iter().map(|c| c[s - 1]));
                }
                row
            })
            .collect();

        Ok(DirectContext {
            state,
            steps,
            rows,
            labels,
            differentiator,
            level_pos,
        })
    }

    /// One prediction per requested horizon, each from that horizon's
    /// estimator, in the training scale.
    fn predict_raw(&self, ctx: &DirectContext<'_, R>) -> Result<Vec<f64>> {
        ctx.steps
            .iter()
            .zip(&ctx.rows)
            .map(|(step, row)| {
                let regressor = ctx
                    .state
                    .regressors
                    .get(step)
                    .ok_or_else(|| ForecastError::InvalidSteps(format!("no model for step {}", step)))?;
                regressor
                    .predict(&Matrix::row_vector(row.clone()))?
                    .first()
                    .copied()
                    .ok_or_else(|| {
                        ForecastError::ComputationError("estimator returned no prediction".to_string())
                    })
            })
            .collect()
    }

    fn finish(&self, ctx: &DirectContext<'_, R>, raw: Vec<f64>) -> Result<Vec<f64>> {
        let values = match &ctx.differentiator {
            Some(d) => d.inverse_transform_next_window(&raw)?,
            None => raw,
        };
        let transformer = ctx
            .state
            .transformers_series
            .get(ctx.level_pos)
            .and_then(|t| t.as_deref());
        inverse_transform_values(transformer, values)
    }

    fn bootstrap_ensemble(
        &self,
        ctx: &DirectContext<'_, R>,
        config: &BootstrapConfig,
    ) -> Result<Vec<Vec<f64>>> {
        if config.use_binned_residuals {
            return Err(ForecastError::InvalidParameter(
                "binned residuals are not available for direct forecasters".to_string(),
            ));
        }
        let residuals = if config.use_in_sample_residuals {
            &ctx.state.in_sample
        } else {
            &self.out_sample
        };
        if residuals.is_empty() {
            return Err(ForecastError::ResidualsUnavailable(if config.use_in_sample_residuals {
                "no in-sample residuals stored; fit with store_in_sample_residuals".to_string()
            } else {
                "no out-of-sample residuals stored; call set_out_sample_residuals".to_string()
            }));
        }
        let pools = ctx
            .steps
            .iter()
            .map(|&s| residuals.for_bootstrap(s))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            steps = ?ctx.steps,
            n_boot = config.n_boot,
            in_sample = config.use_in_sample_residuals,
            "bootstrapping direct forecast"
        );
        let raw = self.predict_raw(ctx)?;
        let mut ensemble = BootstrapSampler::from_config(config)?.perturb(&raw, &pools)?;

        for b in 0..config.n_boot {
            let replicate: Vec<f64> = ensemble.iter().map(|row| row[b]).collect();
            for (row, v) in ensemble.iter_mut().zip(self.finish(ctx, replicate)?) {
                row[b] = v;
            }
        }
        Ok(ensemble)
    }

    /// Point forecast of `level` for the requested horizons (all when
    /// `None`), in the requested order.
    pub fn predict(
        &self,
        steps: Option<&[usize]>,
        last_window: Option<&SeriesFrame>,
        exog: Option<&SeriesFrame>,
    ) -> Result<Forecast> {
        let ctx = self.prepare(steps, last_window, exog)?;
        let values = self.finish(&ctx, self.predict_raw(&ctx)?)?;
        Forecast::from_values(ctx.labels, values)
    }

    /// Bootstrap replicates, one column `pred_boot_{b}` per replicate.
    pub fn predict_bootstrapping(
        &self,
        steps: Option<&[usize]>,
        last_window: Option<&SeriesFrame>,
        exog: Option<&SeriesFrame>,
        config: &BootstrapConfig,
    ) -> Result<ForecastTable> {
        let ctx = self.prepare(steps, last_window, exog)?;
        let ensemble = self.bootstrap_ensemble(&ctx, config)?;
        ForecastTable::new(ctx.labels, boot_columns(config.n_boot), ensemble)
    }

    /// Point forecast with percentile bounds from the bootstrap ensemble.
    pub fn predict_interval(
        &self,
        steps: Option<&[usize]>,
        last_window: Option<&SeriesFrame>,
        exog: Option<&SeriesFrame>,
        interval: [f64; 2],
        config: &BootstrapConfig,
    ) -> Result<Forecast> {
        check_interval(interval)?;
        let ctx = self.prepare(steps, last_window, exog)?;
        let point = self.finish(&ctx, self.predict_raw(&ctx)?)?;
        let ensemble = self.bootstrap_ensemble(&ctx, config)?;
        let (lower, upper) = IntervalEstimator::new(&ensemble).interval(interval)?;
        Forecast::from_values_with_intervals(ctx.labels, point, lower, upper)
    }

    /// Bootstrap quantiles, one column `q_{q}` per quantile.
    pub fn predict_quantiles(
        &self,
        steps: Option<&[usize]>,
        last_window: Option<&SeriesFrame>,
        exog: Option<&SeriesFrame>,
        quantiles: &[f64],
        config: &BootstrapConfig,
    ) -> Result<ForecastTable> {
        check_quantiles(quantiles)?;
        let ctx = self.prepare(steps, last_window, exog)?;
        let ensemble = self.bootstrap_ensemble(&ctx, config)?;
        let rows = IntervalEstimator::new(&ensemble).quantiles(quantiles)?;
        let columns = quantiles.iter().map(|q| format!("q_{}", q)).collect();
        ForecastTable::new(ctx.labels, columns, rows)
    }

    /// Parameters of `distribution` fitted to each horizon's bootstrap
    /// samples.
    pub fn predict_dist(
        &self,
        steps: Option<&[usize]>,
        last_window: Option<&SeriesFrame>,
        exog: Option<&SeriesFrame>,
        distribution: &dyn Distribution,
        config: &BootstrapConfig,
    ) -> Result<ForecastTable> {
        let ctx = self.prepare(steps, last_window, exog)?;
        let ensemble = self.bootstrap_ensemble(&ctx, config)?;
        let rows = IntervalEstimator::new(&ensemble).fit_distribution(distribution)?;
        let columns = distribution
            .param_names()
            .iter()
            .map(|p| p.to_string())
            .collect();
        ForecastTable::new(ctx.labels, columns, rows)
    }

    /// Predictor rows each horizon's estimator sees, in the training scale.
    pub fn create_predict_x(
        &self,
        steps: Option<&[usize]>,
        last_window: Option<&SeriesFrame>,
        exog: Option<&SeriesFrame>,
    ) -> Result<PredictMatrix> {
        let ctx = self.prepare(steps, last_window, exog)?;
        Ok(PredictMatrix {
            x: Matrix::from_rows(ctx.rows)?,
            feature_names: ctx.state.step_feature_names.clone(),
            index: ctx.labels,
        })
    }

    /// Install per-horizon residuals measured on unseen data.
    ///
    /// Horizons outside `1..=steps` are ignored with a warning. With
    /// `transform` the residuals go through the fitted transformer of the
    /// level series. When `append` is set, new values only fill the free
    /// space under the cap.
    pub fn set_out_sample_residuals(
        &mut self,
        residuals: &BTreeMap<usize, Vec<f64>>,
        append: bool,
        transform: bool,
        seed: u64,
    ) -> Result<()> {
        let state = self.fitted.as_ref().ok_or(ForecastError::FitRequired)?;
        let transformer = state
            .transformers_series
            .get(state.level_position(&self.level)?)
            .and_then(|t| t.as_deref());
        match (transformer, transform) {
            (Some(t), true) => warn!(
                transformer = t.name(),
                "residuals are transformed with the transformer used in training"
            ),
            (Some(t), false) => warn!(
                transformer = t.name(),
                "residuals are not transformed; they must already be in the transformed scale"
            ),
            (None, _) => {}
        }

        for (&step, values) in residuals {
            if step == 0 || step > self.steps {
                warn!(
                    step,
                    steps = self.steps,
                    "residuals for a step the forecaster does not predict are ignored"
                );
                continue;
            }
            let values = match (transformer, transform) {
                (Some(t), true) => t.transform(values)?,
                _ => values.clone(),
            };
            if append {
                self.out_sample.append(step, &values, seed);
            } else {
                self.out_sample.insert(step, &values, seed);
            }
        }
        Ok(())
    }

    /// Importance of every feature of one horizon's estimator, or `None`
    /// when it exposes none.
    pub fn get_feature_importances(
        &self,
        step: usize,
        sort: bool,
    ) -> Result<Option<Vec<(String, f64)>>> {
        self.check_step(step)?;
        let state = self.fitted.as_ref().ok_or(ForecastError::FitRequired)?;
        let regressor = state
            .regressors
            .get(&step)
            .ok_or_else(|| ForecastError::InvalidSteps(format!("no model for step {}", step)))?;
        match regressor.feature_importances() {
            Some(importances) => {
                named_importances(&state.step_feature_names, importances, sort).map(Some)
            }
            None => {
                warn!(
                    regressor = regressor.name(),
                    "estimator has no feature importances or coefficients"
                );
                Ok(None)
            }
        }
    }
}

impl<R: Regressor + Clone> fmt::Display for DirectForecaster<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DirectForecaster")?;
        writeln!(f, "Regressor: {}", self.regressor.name())?;
        writeln!(f, "Level: {}", self.level)?;
        writeln!(f, "Steps: {}", self.steps)?;
        match &self.lags {
            Some(SeriesLags::Uniform(l)) => writeln!(f, "Lags: {}", l)?,
            Some(SeriesLags::PerSeries(map)) => {
                let described: Vec<String> = map
                    .iter()
                    .map(|(k, v)| match v {
                        Some(l) => format!("{}: {}", k, l),
                        None => format!("{}: None", k),
                    })
                    .collect();
                writeln!(f, "Lags: {{{}}}", described.join(", "))?
            }
            None => writeln!(f, "Lags: None")?,
        }
        if let Some(wf) = &self.window_features {
            writeln!(f, "Window features: {}", wf.feature_names().join(", "))?;
        }
        writeln!(f, "Window size: {}", self.window_size)?;
        match &self.transformer_series {
            Some(t) => writeln!(f, "Transformer for series: {}", t.name())?,
            None => writeln!(f, "Transformer for series: None")?,
        }
        if let Some(id) = &self.forecaster_id {
            writeln!(f, "Forecaster id: {}", id)?;
        }
        writeln!(
            f,
            "Creation date: {}",
            self.creation_date.format("%Y-%m-%d %H:%M:%S")
        )?;
        match &self.fitted {
            Some(state) => write!(f, "{}", state.info),
            None => write!(f, "Not fitted"),
        }
    }
}
