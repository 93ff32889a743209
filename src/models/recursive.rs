//! Recursive multi-step forecaster.
//!
//! A single estimator is trained to predict one step ahead from lagged
//! values (plus optional exogenous columns). Multi-step forecasts are
//! produced by feeding each prediction back into the lag window of the next
//! step. Residual bootstrapping perturbs each step before it is fed back,
//! so the uncertainty compounds along the horizon.
//!
//! Instead of lags, predictors can come from a user function over a
//! trailing window (see [`CustomPredictors`]).
//!
//! # Example
//!
//! ```
//! use autoreg_forecast::prelude::*;
//!
//! let y = TimeSeries::new((0..40).map(|i| 10.0 + 0.5 * i as f64).collect());
//! let mut forecaster =
//!     RecursiveForecaster::new(LinearRegression::new(), LagSpec::new(vec![1]).unwrap());
//! forecaster.fit(&y, None).unwrap();
//!
//! let forecast = forecaster.predict(3, None, None).unwrap();
//! assert_eq!(forecast.horizon(), 3);
//! assert!((forecast.point()[0] - 30.0).abs() < 1e-6);
//! ```

use super::common::{
    boot_columns, check_last_window, check_predict_exog, check_series, check_train_exog,
    fit_exog_transformers, inverse_transform_values, named_importances, sample_weights,
    transform_exog, transform_values, FitOptions, PredictMatrix, TrainingInfo, TrainingMatrix,
    WeightFn,
};
use crate::core::{Forecast, ForecastTable, Matrix, SeriesFrame, SeriesIndex, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::estimators::Regressor;
use crate::features::{create_lags, CustomPredictors, LagSpec};
use crate::residuals::{BinInterval, BinnedResiduals, BinnerConfig, QuantileBinner, ResidualPools};
use crate::transform::{TimeSeriesDifferentiator, Transformer};
use crate::utils::{
    check_interval, check_quantiles, BootstrapConfig, BootstrapSampler, Distribution,
    IntervalEstimator, NoResiduals, ResidualDraw, ResidualSource,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Source of the autoregressive predictors.
#[derive(Debug, Clone)]
enum Predictors {
    Lags(LagSpec),
    Custom(CustomPredictors),
}

impl Predictors {
    fn window_size(&self) -> usize {
        match self {
            Predictors::Lags(lags) => lags.max_lag(),
            Predictors::Custom(custom) => custom.window_size(),
        }
    }

    fn create(&self, values: &[f64]) -> Result<(Matrix, Vec<f64>, Vec<String>)> {
        match self {
            Predictors::Lags(lags) => {
                let (x, y) = create_lags(values, lags)?;
                Ok((x, y, lags.names("")))
            }
            Predictors::Custom(custom) => {
                let (x, y) = custom.create(values)?;
                let names = custom.names(x.n_cols())?;
                Ok((x, y, names))
            }
        }
    }

    /// Predictors for the value following `window`.
    fn row(&self, window: &[f64]) -> Result<Vec<f64>> {
        match self {
            Predictors::Lags(lags) => lags.row_from_window(window),
            Predictors::Custom(custom) => custom.row(window),
        }
    }
}

impl fmt::Display for Predictors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predictors::Lags(lags) => write!(f, "{}", lags),
            Predictors::Custom(custom) => write!(f, "{}", custom),
        }
    }
}

/// State produced by `fit`; replaced wholesale on every refit.
#[derive(Debug, Clone)]
struct FittedState {
    transformer_y: Option<Box<dyn Transformer>>,
    transformer_exog: Vec<Box<dyn Transformer>>,
    binner: QuantileBinner,
    last_window: Option<TimeSeries>,
    n_predictors: usize,
    info: TrainingInfo,
}

/// Training matrices plus the transformers fitted while building them.
struct TrainingData {
    matrix: TrainingMatrix,
    n_predictors: usize,
    transformer_y: Option<Box<dyn Transformer>>,
    transformer_exog: Vec<Box<dyn Transformer>>,
    exog_names: Option<Vec<String>>,
}

/// Everything a prediction needs, in the transformed (and differenced)
/// scale the estimator was trained in.
struct PredictContext<'a> {
    state: &'a FittedState,
    window: Vec<f64>,
    exog: Option<Matrix>,
    index: SeriesIndex,
    differentiator: Option<TimeSeriesDifferentiator>,
}

/// Single-estimator forecaster that predicts recursively.
pub struct RecursiveForecaster<R> {
    regressor: R,
    predictors: Predictors,
    window_size: usize,
    differentiation: Option<usize>,
    window_size_diff: usize,
    transformer_y: Option<Box<dyn Transformer>>,
    transformer_exog: Option<Box<dyn Transformer>>,
    weight_func: Option<WeightFn>,
    binner_config: BinnerConfig,
    forecaster_id: Option<String>,
    creation_date: DateTime<Utc>,
    fitted: Option<FittedState>,
    residuals: ResidualPools,
}

/// Builder for [`RecursiveForecaster`].
pub struct RecursiveForecasterBuilder<R> {
    regressor: R,
    predictors: Predictors,
    differentiation: Option<usize>,
    transformer_y: Option<Box<dyn Transformer>>,
    transformer_exog: Option<Box<dyn Transformer>>,
    weight_func: Option<WeightFn>,
    binner_config: BinnerConfig,
    forecaster_id: Option<String>,
}

impl<R: Regressor> RecursiveForecasterBuilder<R> {
    /// Transform applied to the target before building lags.
    pub fn transformer_y<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.transformer_y = Some(Box::new(transformer));
        self
    }

    /// Transform fitted independently on every exogenous column.
    pub fn transformer_exog<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.transformer_exog = Some(Box::new(transformer));
        self
    }

    /// Per-row training weights computed from the index of the target rows.
    pub fn weight_func<F>(mut self, func: F) -> Self
    where
        F: Fn(&SeriesIndex) -> Vec<f64> + Send + Sync + 'static,
    {
        self.weight_func = Some(Arc::new(func));
        self
    }

    /// Difference the (transformed) target `order` times before training.
    pub fn differentiation(mut self, order: usize) -> Self {
        self.differentiation = Some(order);
        self
    }

    pub fn binner_config(mut self, config: BinnerConfig) -> Self {
        self.binner_config = config;
        self
    }

    pub fn forecaster_id(mut self, id: impl Into<String>) -> Self {
        self.forecaster_id = Some(id.into());
        self
    }

    pub fn build(self) -> Result<RecursiveForecaster<R>> {
        if let Some(order) = self.differentiation {
            TimeSeriesDifferentiator::new(order)?;
        }
        QuantileBinner::new(self.binner_config.clone())?;
        let window_size = self.predictors.window_size();
        Ok(RecursiveForecaster {
            regressor: self.regressor,
            window_size,
            window_size_diff: window_size + self.differentiation.unwrap_or(0),
            predictors: self.predictors,
            differentiation: self.differentiation,
            transformer_y: self.transformer_y,
            transformer_exog: self.transformer_exog,
            weight_func: self.weight_func,
            binner_config: self.binner_config,
            forecaster_id: self.forecaster_id,
            creation_date: Utc::now(),
            fitted: None,
            residuals: ResidualPools::new(),
        })
    }
}

impl<R: Regressor> RecursiveForecaster<R> {
    /// Forecaster with no transformers, weights or differencing.
    pub fn new(regressor: R, lags: LagSpec) -> Self {
        let window_size = lags.max_lag();
        Self {
            regressor,
            predictors: Predictors::Lags(lags),
            window_size,
            differentiation: None,
            window_size_diff: window_size,
            transformer_y: None,
            transformer_exog: None,
            weight_func: None,
            binner_config: BinnerConfig::default(),
            forecaster_id: None,
            creation_date: Utc::now(),
            fitted: None,
            residuals: ResidualPools::new(),
        }
    }

    pub fn builder(regressor: R, lags: LagSpec) -> RecursiveForecasterBuilder<R> {
        Self::builder_from(regressor, Predictors::Lags(lags))
    }

    /// Builder for a forecaster whose predictors come from `predictors`
    /// instead of lags.
    pub fn custom_builder(
        regressor: R,
        predictors: CustomPredictors,
    ) -> RecursiveForecasterBuilder<R> {
        Self::builder_from(regressor, Predictors::Custom(predictors))
    }

    fn builder_from(regressor: R, predictors: Predictors) -> RecursiveForecasterBuilder<R> {
        RecursiveForecasterBuilder {
            regressor,
            predictors,
            differentiation: None,
            transformer_y: None,
            transformer_exog: None,
            weight_func: None,
            binner_config: BinnerConfig::default(),
            forecaster_id: None,
        }
    }

    pub fn regressor(&self) -> &R {
        &self.regressor
    }

    /// Lags, or `None` when predictors come from a custom function.
    pub fn lags(&self) -> Option<&LagSpec> {
        match &self.predictors {
            Predictors::Lags(lags) => Some(lags),
            Predictors::Custom(_) => None,
        }
    }

    pub fn custom_predictors(&self) -> Option<&CustomPredictors> {
        match &self.predictors {
            Predictors::Custom(custom) => Some(custom),
            Predictors::Lags(_) => None,
        }
    }

    /// Observations needed to build one row of predictors.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Window size plus the differencing order.
    pub fn window_size_diff(&self) -> usize {
        self.window_size_diff
    }

    pub fn differentiation(&self) -> Option<usize> {
        self.differentiation
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

    pub fn training_info(&self) -> Option<&TrainingInfo> {
        self.fitted.as_ref().map(|s| &s.info)
    }

    /// Tail of the training series stored by the last fit.
    pub fn last_window(&self) -> Option<&TimeSeries> {
        self.fitted.as_ref().and_then(|s| s.last_window.as_ref())
    }

    pub fn in_sample_residuals(&self) -> Option<&[f64]> {
        self.residuals.in_sample()
    }

    pub fn in_sample_residuals_by_bin(&self) -> Option<&BinnedResiduals> {
        self.residuals.in_sample_by_bin()
    }

    pub fn out_sample_residuals(&self) -> Option<&[f64]> {
        self.residuals.out_sample()
    }

    pub fn out_sample_residuals_by_bin(&self) -> Option<&BinnedResiduals> {
        self.residuals.out_sample_by_bin()
    }

    /// Value range of every residual bin learned during fit.
    pub fn bin_intervals(&self) -> Result<BTreeMap<usize, BinInterval>> {
        let state = self.fitted.as_ref().ok_or(ForecastError::FitRequired)?;
        state.binner.bin_intervals()
    }

    /// Replace the predictors with lags. The forecaster must be refitted.
    pub fn set_lags(&mut self, lags: LagSpec) {
        self.set_predictors(Predictors::Lags(lags));
    }

    /// Replace the predictors with a custom function. The forecaster must
    /// be refitted.
    pub fn set_custom_predictors(&mut self, predictors: CustomPredictors) {
        self.set_predictors(Predictors::Custom(predictors));
    }

    fn set_predictors(&mut self, predictors: Predictors) {
        self.window_size = predictors.window_size();
        self.window_size_diff = self.window_size + self.differentiation.unwrap_or(0);
        self.predictors = predictors;
        self.reset();
    }

    /// Replace the estimator. The forecaster must be refitted.
    pub fn set_params(&mut self, regressor: R) {
        self.regressor = regressor;
        self.reset();
    }

    fn reset(&mut self) {
        self.fitted = None;
        self.residuals.clear_in_sample();
    }

    fn build_training(&self, y: &TimeSeries, exog: Option<&SeriesFrame>) -> Result<TrainingData> {
        check_series(y, "y")?;
        let n = y.len();
        if n <= self.window_size_diff {
            return Err(ForecastError::InsufficientData {
                needed: self.window_size_diff + 1,
                got: n,
            });
        }
        if let Some(e) = exog {
            check_train_exog(e, y.index())?;
        }

        let transformer_y = match &self.transformer_y {
            Some(t) => {
                let mut t = t.clone();
                t.fit(y.values())?;
                Some(t)
            }
            None => None,
        };
        let values = transform_values(transformer_y.as_deref(), y.values())?;
        let values = match self.differentiation {
            Some(order) => TimeSeriesDifferentiator::new(order)?.fit_transform(&values)?,
            None => values,
        };

        let max_lag = self.window_size;
        let (x_lags, target, mut feature_names) = self.predictors.create(&values)?;
        let n_predictors = feature_names.len();

        let (x, transformer_exog, exog_names) = match exog {
            Some(e) => {
                let names = e.names().to_vec();
                let transformers = fit_exog_transformers(self.transformer_exog.as_deref(), e)?;
                let columns = transform_exog(e, &names, &transformers, max_lag, n)?;
                let x_exog = Matrix::from_columns(n - max_lag, &columns)?;
                feature_names.extend(names.iter().cloned());
                (x_lags.hstack(&x_exog)?, transformers, Some(names))
            }
            None => (x_lags, Vec::new(), None),
        };

        // Rows whose lags reach into the differencing padding are dropped.
        let skip = self.differentiation.unwrap_or(0);
        let x = x.slice_rows(skip, x.n_rows());
        let target = target[skip..].to_vec();
        let index = y.index().slice(max_lag + skip, n);

        Ok(TrainingData {
            matrix: TrainingMatrix {
                x,
                y: target,
                feature_names,
                index,
            },
            n_predictors,
            transformer_y,
            transformer_exog,
            exog_names,
        })
    }

    /// Lag (and exogenous) design matrix with its one-step-ahead targets.
    ///
    /// The matrix has `len(y) - max_lag - differentiation` rows.
    pub fn create_train_x_y(
        &self,
        y: &TimeSeries,
        exog: Option<&SeriesFrame>,
    ) -> Result<TrainingMatrix> {
        Ok(self.build_training(y, exog)?.matrix)
    }

    /// Fit storing the last window and in-sample residuals.
    pub fn fit(&mut self, y: &TimeSeries, exog: Option<&SeriesFrame>) -> Result<()> {
        self.fit_with_options(y, exog, FitOptions::default())
    }

    /// Fit the estimator on `y` (and `exog`).
    ///
    /// Any previous fitted state and in-sample residuals are discarded
    /// before training; out-of-sample residuals are kept.
    pub fn fit_with_options(
        &mut self,
        y: &TimeSeries,
        exog: Option<&SeriesFrame>,
        options: FitOptions,
    ) -> Result<()> {
        self.reset();

        let data = self.build_training(y, exog)?;
        let weights = sample_weights(self.weight_func.as_ref(), &data.matrix.index)?;
        self.regressor
            .fit(&data.matrix.x, &data.matrix.y, weights.as_deref())?;

        let fitted_values = self.regressor.predict(&data.matrix.x)?;
        let mut binner = QuantileBinner::new(self.binner_config.clone())?;
        binner.fit(&fitted_values)?;

        if options.store_in_sample_residuals {
            let residuals: Vec<f64> = data
                .matrix
                .y
                .iter()
                .zip(&fitted_values)
                .map(|(actual, fitted)| actual - fitted)
                .collect();
            self.residuals
                .set_in_sample(&residuals, &fitted_values, &binner)?;
        }

        let last_window = options
            .store_last_window
            .then(|| y.tail(self.window_size_diff));
        let n_rows = data.matrix.x.n_rows();
        let info = TrainingInfo::new(y.index(), data.exog_names, data.matrix.feature_names)?;

        info!(
            regressor = self.regressor.name(),
            predictors = %self.predictors,
            rows = n_rows,
            features = info.feature_names.len(),
            "fitted recursive forecaster"
        );

        self.fitted = Some(FittedState {
            transformer_y: data.transformer_y,
            transformer_exog: data.transformer_exog,
            binner,
            last_window,
            n_predictors: data.n_predictors,
            info,
        });
        Ok(())
    }

    fn prepare(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&SeriesFrame>,
    ) -> Result<PredictContext<'_>> {
        let state = self.fitted.as_ref().ok_or(ForecastError::FitRequired)?;
        if steps == 0 {
            return Err(ForecastError::InvalidSteps(
                "steps must be greater than 0".to_string(),
            ));
        }
        let window = last_window.or(state.last_window.as_ref()).ok_or_else(|| {
            ForecastError::InvalidParameter(
                "last_window must be provided when the forecaster was fitted without \
                 storing it"
                    .to_string(),
            )
        })?;
        check_last_window(
            window.len(),
            window.index(),
            self.window_size_diff,
            &state.info,
            window.has_missing(),
        )?;
        let window = window.tail(self.window_size_diff);
        let index = window.index().extend(steps);

        let exog = match (&state.info.exog_names, exog) {
            (Some(names), Some(e)) => {
                check_predict_exog(e, names, steps, index.first())?;
                let columns = transform_exog(e, names, &state.transformer_exog, 0, steps)?;
                Some(Matrix::from_columns(steps, &columns)?)
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

        let values = transform_values(state.transformer_y.as_deref(), window.values())?;
        let (values, differentiator) = match self.differentiation {
            Some(order) => {
                let mut d = TimeSeriesDifferentiator::new(order)?;
                let diffed = d.fit_transform(&values)?;
                (diffed, Some(d))
            }
            None => (values, None),
        };

        Ok(PredictContext {
            state,
            window: values,
            exog,
            index,
            differentiator,
        })
    }

    /// Run the recursive loop, adding `draw`'s residual to every step before
    /// it becomes a lag of the next one. Output is in the training scale.
    fn recursive_predict(
        &self,
        ctx: &PredictContext<'_>,
        steps: usize,
        draw: &mut dyn ResidualDraw,
    ) -> Result<Vec<f64>> {
        let n = ctx.window.len();
        let mut buffer = ctx.window.clone();
        buffer.resize(n + steps, f64::NAN);

        for i in 0..steps {
            let pos = n + i;
            let row = self.predictor_row(ctx, &buffer[..pos], i)?;
            let prediction = self
                .regressor
                .predict(&Matrix::row_vector(row))?
                .first()
                .copied()
                .ok_or_else(|| {
                    ForecastError::ComputationError("estimator returned no prediction".to_string())
                })?;
            buffer[pos] = prediction + draw.draw(i, prediction)?;
        }
        Ok(buffer.split_off(n))
    }

    /// Predictor row for step `i` from the values before it.
    fn predictor_row(
        &self,
        ctx: &PredictContext<'_>,
        history: &[f64],
        i: usize,
    ) -> Result<Vec<f64>> {
        let mut row = self.predictors.row(history)?;
        if row.len() != ctx.state.n_predictors {
            return Err(ForecastError::DimensionMismatch {
                expected: ctx.state.n_predictors,
                got: row.len(),
            });
        }
        if let Some(exog) = &ctx.exog {
            row.extend_from_slice(exog.row(i));
        }
        Ok(row)
    }

    /// Undo differencing, then the target transform.
    fn finish(&self, ctx: &PredictContext<'_>, raw: Vec<f64>) -> Result<Vec<f64>> {
        let values = match &ctx.differentiator {
            Some(d) => d.inverse_transform_next_window(&raw)?,
            None => raw,
        };
        inverse_transform_values(ctx.state.transformer_y.as_deref(), values)
    }

    fn point(&self, ctx: &PredictContext<'_>, steps: usize) -> Result<Vec<f64>> {
        let raw = self.recursive_predict(ctx, steps, &mut NoResiduals)?;
        self.finish(ctx, raw)
    }

    /// Bootstrap ensemble laid out as `ensemble[step][replicate]`.
    fn bootstrap_ensemble(
        &self,
        ctx: &PredictContext<'_>,
        steps: usize,
        config: &BootstrapConfig,
    ) -> Result<Vec<Vec<f64>>> {
        let sampler = BootstrapSampler::from_config(config)?;
        let source = if config.use_binned_residuals {
            ResidualSource::Binned {
                pools: self.residuals.binned(config.use_in_sample_residuals)?,
                binner: &ctx.state.binner,
            }
        } else {
            ResidualSource::Flat(self.residuals.flat(config.use_in_sample_residuals)?)
        };
        debug!(
            steps,
            n_boot = config.n_boot,
            binned = config.use_binned_residuals,
            in_sample = config.use_in_sample_residuals,
            "bootstrapping recursive forecast"
        );
        sampler.run(steps, source, |draw| {
            let raw = self.recursive_predict(ctx, steps, draw)?;
            self.finish(ctx, raw)
        })
    }

    /// Point forecast for the next `steps` values.
    ///
    /// `last_window` replaces the window stored at fit time; `exog` must be
    /// given when the forecaster was trained with exogenous variables and
    /// must start right after the window.
    pub fn predict(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&SeriesFrame>,
    ) -> Result<Forecast> {
        let ctx = self.prepare(steps, last_window, exog)?;
        let values = self.point(&ctx, steps)?;
        Forecast::from_values(ctx.index.labels(), values)
    }

    /// Bootstrap replicates, one column `pred_boot_{b}` per replicate.
    pub fn predict_bootstrapping(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&SeriesFrame>,
        config: &BootstrapConfig,
    ) -> Result<ForecastTable> {
        let ctx = self.prepare(steps, last_window, exog)?;
        let ensemble = self.bootstrap_ensemble(&ctx, steps, config)?;
        ForecastTable::new(ctx.index.labels(), boot_columns(config.n_boot), ensemble)
    }

    /// Point forecast with percentile bounds from the bootstrap ensemble.
    pub fn predict_interval(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&SeriesFrame>,
        interval: [f64; 2],
        config: &BootstrapConfig,
    ) -> Result<Forecast> {
        check_interval(interval)?;
        let ctx = self.prepare(steps, last_window, exog)?;
        let point = self.point(&ctx, steps)?;
        let ensemble = self.bootstrap_ensemble(&ctx, steps, config)?;
        let (lower, upper) = IntervalEstimator::new(&ensemble).interval(interval)?;
        Forecast::from_values_with_intervals(ctx.index.labels(), point, lower, upper)
    }

    /// Bootstrap quantiles, one column `q_{q}` per quantile.
    pub fn predict_quantiles(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&SeriesFrame>,
        quantiles: &[f64],
        config: &BootstrapConfig,
    ) -> Result<ForecastTable> {
        check_quantiles(quantiles)?;
        let ctx = self.prepare(steps, last_window, exog)?;
        let ensemble = self.bootstrap_ensemble(&ctx, steps, config)?;
        let rows = IntervalEstimator::new(&ensemble).quantiles(quantiles)?;
        let columns = quantiles.iter().map(|q| format!("q_{}", q)).collect();
        ForecastTable::new(ctx.index.labels(), columns, rows)
    }

    /// Parameters of `distribution` fitted to each step's bootstrap samples.
    pub fn predict_dist(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&SeriesFrame>,
        distribution: &dyn Distribution,
        config: &BootstrapConfig,
    ) -> Result<ForecastTable> {
        let ctx = self.prepare(steps, last_window, exog)?;
        let ensemble = self.bootstrap_ensemble(&ctx, steps, config)?;
        let rows = IntervalEstimator::new(&ensemble).fit_distribution(distribution)?;
        let columns = distribution
            .param_names()
            .iter()
            .map(|p| p.to_string())
            .collect();
        ForecastTable::new(ctx.index.labels(), columns, rows)
    }

    /// Predictor rows the estimator sees at each step of a point forecast,
    /// in the transformed (and differenced) scale.
    pub fn create_predict_x(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&SeriesFrame>,
    ) -> Result<PredictMatrix> {
        let ctx = self.prepare(steps, last_window, exog)?;
        let raw = self.recursive_predict(&ctx, steps, &mut NoResiduals)?;
        let mut buffer = ctx.window.clone();
        let n = buffer.len();
        buffer.extend(raw);

        let rows = (0..steps)
            .map(|i| self.predictor_row(&ctx, &buffer[..n + i], i))
            .collect::<Result<Vec<_>>>()?;
        Ok(PredictMatrix {
            x: Matrix::from_rows(rows)?,
            feature_names: ctx.state.info.feature_names.clone(),
            index: ctx.index.labels(),
        })
    }

    /// Install residuals measured on data the estimator has not seen.
    ///
    /// With `predictions` the residuals are also grouped by the bin of the
    /// prediction they belong to, enabling binned bootstrapping; bins left
    /// empty are back-filled from the pooled residuals. With `transform`
    /// both are mapped through the fitted target transformer first. When
    /// `append` is set, new values only fill the free space under the caps.
    pub fn set_out_sample_residuals(
        &mut self,
        residuals: &[f64],
        predictions: Option<&[f64]>,
        append: bool,
        transform: bool,
        seed: u64,
    ) -> Result<()> {
        if residuals.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        if let Some(p) = predictions {
            if p.len() != residuals.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: residuals.len(),
                    got: p.len(),
                });
            }
        }

        let (residuals, predictions) = match (&self.transformer_y, transform) {
            (Some(_), true) => {
                let t = self
                    .fitted
                    .as_ref()
                    .and_then(|s| s.transformer_y.as_deref())
                    .ok_or(ForecastError::FitRequired)?;
                warn!(
                    transformer = t.name(),
                    "residuals are transformed with the transformer used in training"
                );
                let predictions = predictions.map(|p| t.transform(p)).transpose()?;
                (t.transform(residuals)?, predictions)
            }
            (Some(t), false) => {
                warn!(
                    transformer = t.name(),
                    "residuals are not transformed; they must already be in the transformed scale"
                );
                (residuals.to_vec(), predictions.map(|p| p.to_vec()))
            }
            (None, _) => (residuals.to_vec(), predictions.map(|p| p.to_vec())),
        };

        match predictions {
            Some(p) => {
                let state = self.fitted.as_ref().ok_or(ForecastError::FitRequired)?;
                self.residuals
                    .set_out_sample_binned(&residuals, &p, &state.binner, append, seed)
            }
            None => {
                self.residuals.set_out_sample(&residuals, append, seed);
                Ok(())
            }
        }
    }

    /// Importance of every training feature, or `None` when the estimator
    /// exposes none.
    pub fn get_feature_importances(&self, sort: bool) -> Result<Option<Vec<(String, f64)>>> {
        let state = self.fitted.as_ref().ok_or(ForecastError::FitRequired)?;
        match self.regressor.feature_importances() {
            Some(importances) => {
                named_importances(&state.info.feature_names, importances, sort).map(Some)
            }
            None => {
                warn!(
                    regressor = self.regressor.name(),
                    "estimator has no feature importances or coefficients"
                );
                Ok(None)
            }
        }
    }
}

impl<R: Regressor> fmt::Display for RecursiveForecaster<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RecursiveForecaster")?;
        writeln!(f, "Regressor: {}", self.regressor.name())?;
        match &self.predictors {
            Predictors::Lags(lags) => writeln!(f, "Lags: {}", lags)?,
            Predictors::Custom(custom) => writeln!(f, "Predictors: {}", custom)?,
        }
        writeln!(f, "Window size: {}", self.window_size)?;
        match self.differentiation {
            Some(d) => writeln!(f, "Differentiation order: {}", d)?,
            None => writeln!(f, "Differentiation order: None")?,
        }
        match &self.transformer_y {
            Some(t) => writeln!(f, "Transformer for y: {}", t.name())?,
            None => writeln!(f, "Transformer for y: None")?,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::LinearRegression;
    use crate::transform::StandardScaler;
    use crate::utils::Normal;
    use approx::assert_relative_eq;

    /// Predicts the mean of each input row.
    #[derive(Debug, Clone, Default)]
    struct RowMean;

    impl Regressor for RowMean {
        fn fit(&mut self, _x: &Matrix, _y: &[f64], _w: Option<&[f64]>) -> Result<()> {
            Ok(())
        }

        fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
            Ok(x.rows()
                .map(|r| r.iter().sum::<f64>() / r.len() as f64)
                .collect())
        }

        fn name(&self) -> &str {
            "RowMean"
        }
    }

    fn trend(n: usize) -> TimeSeries {
        TimeSeries::new((0..n).map(|i| 10.0 + 0.5 * i as f64).collect())
    }

    fn noisy(n: usize) -> TimeSeries {
        TimeSeries::new(
            (0..n)
                .map(|i| 20.0 + (i as f64 * 0.7).sin() * 3.0 + ((i * 7919) % 13) as f64 * 0.1)
                .collect(),
        )
    }

    fn lags(v: &[usize]) -> LagSpec {
        LagSpec::new(v.to_vec()).unwrap()
    }

    #[test]
    fn row_mean_predicts_from_last_window() {
        let y = TimeSeries::new((1..=10).map(|v| v as f64).collect());
        let mut f = RecursiveForecaster::new(RowMean, lags(&[1, 2, 3]));
        f.fit(&y, None).unwrap();
        let window = TimeSeries::new(vec![8.0, 9.0, 10.0]);
        let forecast = f.predict(1, Some(&window), None).unwrap();
        assert_relative_eq!(forecast.point()[0], 9.0);
    }

    #[test]
    fn predictions_feed_back_into_lags() {
        let y = TimeSeries::new((1..=10).map(|v| v as f64).collect());
        let mut f = RecursiveForecaster::new(RowMean, lags(&[1, 2]));
        f.fit(&y, None).unwrap();
        let forecast = f.predict(3, None, None).unwrap();
        // (9 + 10) / 2, then (10 + 9.5) / 2, then (9.5 + 9.75) / 2.
        assert_eq!(forecast.point(), &[9.5, 9.75, 9.625]);
        assert_eq!(
            forecast.index(),
            &[
                crate::core::IndexLabel::Position(10),
                crate::core::IndexLabel::Position(11),
                crate::core::IndexLabel::Position(12)
            ]
        );
    }

    #[test]
    fn train_matrix_shape_and_names() {
        let f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1, 3]));
        let m = f.create_train_x_y(&trend(10), None).unwrap();
        assert_eq!(m.x.shape(), (7, 2));
        assert_eq!(m.feature_names, vec!["lag_1", "lag_3"]);
        assert_eq!(m.y.len(), 7);
        // First row predicts y[3] from y[2] and y[0].
        assert_eq!(m.x.row(0), &[11.0, 10.0]);
        assert_eq!(m.y[0], 11.5);
        assert_eq!(m.index.first(), Some(crate::core::IndexLabel::Position(3)));
    }

    #[test]
    fn differencing_drops_rows_and_extends_window() {
        let f = RecursiveForecaster::builder(LinearRegression::new(), lags(&[1, 2]))
            .differentiation(1)
            .build()
            .unwrap();
        assert_eq!(f.window_size(), 2);
        assert_eq!(f.window_size_diff(), 3);
        let m = f.create_train_x_y(&trend(10), None).unwrap();
        assert_eq!(m.x.n_rows(), 10 - 2 - 1);
        assert!(!m.x.has_nan());
    }

    #[test]
    fn linear_trend_is_extrapolated() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1]));
        f.fit(&trend(40), None).unwrap();
        let forecast = f.predict(5, None, None).unwrap();
        for (i, v) in forecast.point().iter().enumerate() {
            assert_relative_eq!(*v, 10.0 + 0.5 * (40 + i) as f64, epsilon = 1e-4);
        }
    }

    #[test]
    fn differenced_forecast_integrates_back() {
        // Increments follow an exact AR(2) recurrence around 0.5.
        let increment = |j: usize| 0.5 + (0.3 * j as f64).sin();
        let level = |t: usize| (0..=t).map(increment).sum::<f64>();
        let y = TimeSeries::new((0..40).map(level).collect());

        let mut f = RecursiveForecaster::builder(LinearRegression::new(), lags(&[1, 2]))
            .differentiation(1)
            .transformer_y(StandardScaler::new())
            .build()
            .unwrap();
        f.fit(&y, None).unwrap();
        assert_eq!(f.last_window().unwrap().len(), 3);
        let forecast = f.predict(4, None, None).unwrap();
        for (i, v) in forecast.point().iter().enumerate() {
            assert_relative_eq!(*v, level(40 + i), epsilon = 1e-5);
        }
    }

    #[test]
    fn predict_requires_fit_and_valid_steps() {
        let f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1]));
        assert_eq!(f.predict(1, None, None), Err(ForecastError::FitRequired));

        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1]));
        f.fit(&trend(10), None).unwrap();
        assert!(matches!(
            f.predict(0, None, None),
            Err(ForecastError::InvalidSteps(_))
        ));
    }

    #[test]
    fn short_series_is_rejected() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1, 2, 3]));
        assert_eq!(
            f.fit(&trend(3), None),
            Err(ForecastError::InsufficientData { needed: 4, got: 3 })
        );
        let nan = TimeSeries::new(vec![1.0, f64::NAN, 3.0, 4.0, 5.0]);
        assert!(matches!(
            f.fit(&nan, None),
            Err(ForecastError::MissingValues(_))
        ));
    }

    #[test]
    fn last_window_checks() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1, 2, 3]));
        f.fit_with_options(&trend(20), None, FitOptions::new().without_last_window())
            .unwrap();
        assert!(f.last_window().is_none());
        assert!(matches!(
            f.predict(1, None, None),
            Err(ForecastError::InvalidParameter(_))
        ));
        let short = TimeSeries::new(vec![1.0, 2.0]);
        assert!(matches!(
            f.predict(1, Some(&short), None),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn exog_is_used_and_validated() {
        let n = 30;
        let x: Vec<f64> = (0..n).map(|i| (i % 4) as f64).collect();
        let y = TimeSeries::new((0..n).map(|i| 5.0 + 2.0 * x[i] + 0.1 * i as f64).collect());
        let exog = SeriesFrame::from_columns(vec![("x".into(), x)]).unwrap();
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1]));
        f.fit(&y, Some(&exog)).unwrap();
        assert_eq!(
            f.training_info().unwrap().feature_names,
            vec!["lag_1".to_string(), "x".to_string()]
        );

        let future_index = y.index().extend(2);
        let future = SeriesFrame::new(future_index, vec![("x".into(), vec![2.0, 3.0])]).unwrap();
        assert_eq!(f.predict(2, None, Some(&future)).unwrap().horizon(), 2);
        assert!(f.predict(2, None, None).is_err());
        assert!(f.predict(3, None, Some(&future)).is_err());

        let pm = f.create_predict_x(2, None, Some(&future)).unwrap();
        assert_eq!(pm.x.shape(), (2, 2));
        assert_eq!(pm.x.row(0)[1], 2.0);
    }

    #[test]
    fn refit_resets_in_sample_but_keeps_out_sample() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1, 2]));
        f.fit(&noisy(50), None).unwrap();
        assert!(f.in_sample_residuals().is_some());
        f.set_out_sample_residuals(&[0.1, -0.1, 0.2], None, false, false, 1)
            .unwrap();

        f.fit_with_options(
            &noisy(60),
            None,
            FitOptions::new().without_in_sample_residuals(),
        )
        .unwrap();
        assert!(f.in_sample_residuals().is_none());
        assert_eq!(f.out_sample_residuals(), Some(&[0.1, -0.1, 0.2][..]));
    }

    #[test]
    fn bootstrapping_is_seeded() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1, 2, 3]));
        f.fit(&noisy(80), None).unwrap();
        let config = BootstrapConfig::new(20).with_seed(7);
        let a = f.predict_bootstrapping(4, None, None, &config).unwrap();
        let b = f.predict_bootstrapping(4, None, None, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_rows(), 4);
        assert_eq!(a.columns()[0], "pred_boot_0");
        assert_eq!(a.n_cols(), 20);

        let binned = config.clone().with_binned_residuals();
        let c = f.predict_bootstrapping(4, None, None, &binned).unwrap();
        let d = f.predict_bootstrapping(4, None, None, &binned).unwrap();
        assert_eq!(c, d);
    }

    #[test]
    fn out_sample_bootstrap_requires_residuals() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1, 2]));
        f.fit(&noisy(40), None).unwrap();
        let config = BootstrapConfig::new(10).with_out_sample_residuals();
        assert!(matches!(
            f.predict_bootstrapping(2, None, None, &config),
            Err(ForecastError::ResidualsUnavailable(_))
        ));
        let binned = config.clone().with_binned_residuals();
        assert!(matches!(
            f.predict_bootstrapping(2, None, None, &binned),
            Err(ForecastError::ResidualsUnavailable(_))
        ));
    }

    #[test]
    fn interval_quantile_and_dist_outputs() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1, 2, 3]));
        f.fit(&noisy(80), None).unwrap();
        let config = BootstrapConfig::new(100).with_seed(3);

        let forecast = f
            .predict_interval(3, None, None, crate::models::DEFAULT_INTERVAL, &config)
            .unwrap();
        let point = f.predict(3, None, None).unwrap();
        assert_eq!(forecast.point(), point.point());
        let (lower, upper) = (forecast.lower().unwrap(), forecast.upper().unwrap());
        assert!(lower.iter().zip(upper).all(|(l, u)| l <= u));

        let q = f
            .predict_quantiles(3, None, None, &crate::models::DEFAULT_QUANTILES, &config)
            .unwrap();
        assert_eq!(q.columns(), &["q_0.05", "q_0.5", "q_0.95"]);
        assert!(q.rows().iter().all(|r| r[0] <= r[1] && r[1] <= r[2]));

        let dist = f.predict_dist(3, None, None, &Normal, &config).unwrap();
        assert_eq!(dist.columns(), &["loc", "scale"]);

        assert!(f
            .predict_interval(3, None, None, [90.0, 10.0], &config)
            .is_err());
        assert!(f
            .predict_quantiles(3, None, None, &[1.5], &config)
            .is_err());
    }

    #[test]
    fn binned_out_sample_residuals_fill_every_bin() {
        let mut f = RecursiveForecaster::builder(LinearRegression::new(), lags(&[1, 2]))
            .binner_config(BinnerConfig::new(3))
            .build()
            .unwrap();
        f.fit(&noisy(60), None).unwrap();
        let n_bins = f.bin_intervals().unwrap().len();

        // All predictions fall in the lowest bin.
        let preds = vec![-1e6; 5];
        let residuals = vec![0.5, -0.5, 0.25, -0.25, 0.0];
        f.set_out_sample_residuals(&residuals, Some(&preds), false, false, 11)
            .unwrap();
        let by_bin = f.out_sample_residuals_by_bin().unwrap();
        assert_eq!(by_bin.n_bins(), n_bins);
        assert!(by_bin.iter().all(|(_, v)| !v.is_empty()));
    }

    #[test]
    fn transformed_predictions_are_binned_in_training_scale() {
        let mut f = RecursiveForecaster::builder(LinearRegression::new(), lags(&[1, 2]))
            .transformer_y(StandardScaler::new())
            .binner_config(BinnerConfig::new(3))
            .build()
            .unwrap();
        f.fit(&noisy(60), None).unwrap();

        let state = f.fitted.as_ref().unwrap();
        let t = state.transformer_y.as_deref().unwrap();
        let scaled_bin = state.binner.bin_of(t.transform(&[20.0]).unwrap()[0]).unwrap();
        let raw_bin = state.binner.bin_of(20.0).unwrap();
        assert_ne!(scaled_bin, raw_bin);

        let residuals = vec![0.5, -0.5, 0.25, -0.25, 0.0];
        f.set_out_sample_residuals(&residuals, Some(&[20.0; 5]), false, true, 3)
            .unwrap();
        let by_bin = f.out_sample_residuals_by_bin().unwrap();
        assert_eq!(by_bin.get(scaled_bin).unwrap().len(), 5);
        assert_ne!(by_bin.get(raw_bin).unwrap().len(), 5);
    }

    #[test]
    fn feature_importances_follow_coefficients() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1, 2]));
        f.fit(&noisy(50), None).unwrap();
        let imp = f.get_feature_importances(false).unwrap().unwrap();
        assert_eq!(imp.len(), 2);
        assert_eq!(imp[0].0, "lag_1");

        let mut g = RecursiveForecaster::new(RowMean, lags(&[1]));
        g.fit(&noisy(20), None).unwrap();
        assert_eq!(g.get_feature_importances(true).unwrap(), None);
    }

    #[test]
    fn set_lags_requires_refit() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1]));
        f.fit(&noisy(30), None).unwrap();
        f.set_lags(lags(&[1, 5]));
        assert!(!f.is_fitted());
        assert_eq!(f.window_size(), 5);
        f.fit(&noisy(30), None).unwrap();
        assert_eq!(f.last_window().unwrap().len(), 5);
    }

    #[test]
    fn custom_predictors_replace_lags() {
        let mut f = RecursiveForecaster::new(LinearRegression::new(), lags(&[1]));
        f.fit(&noisy(30), None).unwrap();
        let custom =
            CustomPredictors::new(|w: &[f64]| vec![w[w.len() - 1], w[0]], 6).unwrap();
        f.set_custom_predictors(custom);
        assert!(!f.is_fitted());
        assert!(f.lags().is_none());
        assert_eq!(f.custom_predictors().map(|c| c.window_size()), Some(6));
        assert_eq!(f.window_size(), 6);

        f.fit(&noisy(30), None).unwrap();
        let m = f.create_train_x_y(&noisy(30), None).unwrap();
        assert_eq!(m.x.shape(), (24, 2));
        assert_eq!(m.x.row(0)[1], noisy(30).values()[0]);
        assert!(f.to_string().contains("Predictors: custom function (window size 6)"));
        assert_eq!(f.predict(3, None, None).unwrap().horizon(), 3);
    }

    #[test]
    fn custom_row_width_must_match_training() {
        // Wider rows once the window holds large values.
        let custom = CustomPredictors::new(
            |w: &[f64]| {
                if w[w.len() - 1] > 100.0 {
                    vec![w[0], w[1], 0.0]
                } else {
                    vec![w[0], w[1]]
                }
            },
            2,
        )
        .unwrap();
        let mut f = RecursiveForecaster::custom_builder(RowMean, custom)
            .build()
            .unwrap();
        f.fit(&trend(20), None).unwrap();
        let window = TimeSeries::new(vec![500.0, 600.0]);
        assert_eq!(
            f.predict(1, Some(&window), None),
            Err(ForecastError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        );
    }

    #[test]
    fn invalid_builder_settings_fail() {
        assert!(matches!(
            RecursiveForecaster::builder(LinearRegression::new(), lags(&[1]))
                .differentiation(0)
                .build(),
            Err(ForecastError::InvalidDifferentiation(0))
        ));
        assert!(RecursiveForecaster::builder(LinearRegression::new(), lags(&[1]))
            .binner_config(BinnerConfig::new(0))
            .build()
            .is_err());
    }

    #[test]
    fn sample_weights_reach_the_estimator() {
        let mut f = RecursiveForecaster::builder(LinearRegression::new(), lags(&[1]))
            .weight_func(|idx| vec![0.0; idx.len()])
            .build()
            .unwrap();
        assert!(matches!(
            f.fit(&noisy(20), None),
            Err(ForecastError::InvalidSampleWeight(_))
        ));
    }
}
