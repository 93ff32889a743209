//! Stateful differencing with anchored inversion.
//!
//! `fit` records the first and last value at every differencing level so
//! that predictions made in the differenced scale can be integrated back
//! either from the start of the fitted window or as its continuation.

use crate::error::{ForecastError, Result};

/// Difference `series` once, `order` times.
pub fn difference(series: &[f64], order: usize) -> Vec<f64> {
    let mut result = series.to_vec();
    for _ in 0..order {
        if result.len() <= 1 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Differencer of a fixed order.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesDifferentiator {
    order: usize,
    initial_values: Vec<f64>,
    last_values: Vec<f64>,
}

impl TimeSeriesDifferentiator {
    pub fn new(order: usize) -> Result<Self> {
        if order == 0 {
            return Err(ForecastError::InvalidDifferentiation(order));
        }
        Ok(Self {
            order,
            initial_values: Vec::new(),
            last_values: Vec::new(),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn is_fitted(&self) -> bool {
        self.last_values.len() == self.order
    }

    /// Anchor values at each level: `(first, last)` from the raw level down.
    pub fn anchors(&self) -> (&[f64], &[f64]) {
        (&self.initial_values, &self.last_values)
    }

    /// Record the first and last value of every differencing level.
    pub fn fit(&mut self, series: &[f64]) -> Result<()> {
        if series.len() <= self.order {
            return Err(ForecastError::InsufficientData {
                needed: self.order + 1,
                got: series.len(),
            });
        }
        self.initial_values.clear();
        self.last_values.clear();
        let mut level = series.to_vec();
        for _ in 0..self.order {
            self.initial_values.push(level[0]);
            self.last_values.push(level[level.len() - 1]);
            level = difference(&level, 1);
        }
        Ok(())
    }

    /// Difference `series`, padding the first `order` positions with NaN so
    /// the output keeps the input length.
    pub fn transform(&self, series: &[f64]) -> Vec<f64> {
        let mut out = vec![f64::NAN; self.order.min(series.len())];
        out.extend(difference(series, self.order));
        out
    }

    pub fn fit_transform(&mut self, series: &[f64]) -> Result<Vec<f64>> {
        self.fit(series)?;
        Ok(self.transform(series))
    }

    /// Rebuild the fitted series from its differenced form, anchored on the
    /// first values. Leading NaNs are dropped.
    pub fn inverse_transform(&self, differenced: &[f64]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(ForecastError::FitRequired);
        }
        let start = differenced
            .iter()
            .position(|v| !v.is_nan())
            .unwrap_or(differenced.len());
        let mut level = differenced[start..].to_vec();
        for init in self.initial_values.iter().rev() {
            let mut next = Vec::with_capacity(level.len() + 1);
            let mut acc = *init;
            next.push(acc);
            for d in &level {
                acc += d;
                next.push(acc);
            }
            level = next;
        }
        Ok(level)
    }

    /// Integrate predictions that continue the fitted window, anchored on
    /// the last value of every level.
    pub fn inverse_transform_next_window(&self, differenced: &[f64]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(ForecastError::FitRequired);
        }
        let mut level: Vec<f64> = differenced.iter().copied().filter(|v| !v.is_nan()).collect();
        for anchor in self.last_values.iter().rev() {
            let mut acc = *anchor;
            for v in level.iter_mut() {
                acc += *v;
                *v = acc;
            }
        }
        Ok(level)
    }
}
