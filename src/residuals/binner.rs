//! Quantile discretizer over predicted values.
//!
//! Bins are half-open `[edge_i, edge_{i+1})` except the last, which takes
//! everything above its lower edge. Values below the first edge fall in
//! bin 0.

use crate::error::{ForecastError, Result};
use crate::utils::stats::{quantile_sorted, sorted};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Configuration of the residual binner.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnerConfig {
    /// Requested number of quantile bins.
    pub n_bins: usize,
    /// Maximum number of values used to compute the edges.
    pub subsample: usize,
    /// Seed for subsampling.
    pub seed: u64,
}

impl Default for BinnerConfig {
    fn default() -> Self {
        Self {
            n_bins: 10,
            subsample: 200_000,
            seed: 789_654,
        }
    }
}

impl BinnerConfig {
    pub fn new(n_bins: usize) -> Self {
        Self {
            n_bins,
            ..Default::default()
        }
    }

    pub fn with_subsample(mut self, subsample: usize) -> Self {
        self.subsample = subsample;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Value range covered by one bin. `upper` is `None` for the last bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinInterval {
    pub lower: f64,
    pub upper: Option<f64>,
}

/// Quantile binner fitted on in-sample predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileBinner {
    config: BinnerConfig,
    edges: Option<Vec<f64>>,
}

impl QuantileBinner {
    pub fn new(config: BinnerConfig) -> Result<Self> {
        if config.n_bins == 0 {
            return Err(ForecastError::InvalidParameter(
                "n_bins must be greater than 0".to_string(),
            ));
        }
        if config.subsample == 0 {
            return Err(ForecastError::InvalidParameter(
                "subsample must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            config,
            edges: None,
        })
    }

    pub fn config(&self) -> &BinnerConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.edges.is_some()
    }

    /// Fitted edges, `n_bins + 1` of them.
    pub fn edges(&self) -> Option<&[f64]> {
        self.edges.as_deref()
    }

    /// Number of bins after fitting (may be below the requested count when
    /// quantiles coincide).
    pub fn n_bins(&self) -> usize {
        self.edges.as_ref().map_or(0, |e| e.len() - 1)
    }

    /// Compute quantile edges. Bins narrower than `1e-8` and bins the fitting
    /// sample leaves empty are merged into a neighbour, so every fitted bin
    /// holds at least one fitting value.
    pub fn fit(&mut self, values: &[f64]) -> Result<()> {
        let data: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if data.is_empty() {
            return Err(ForecastError::EmptyData);
        }

        let sample = if data.len() > self.config.subsample {
            let mut rng = StdRng::seed_from_u64(self.config.seed);
            rand::seq::index::sample(&mut rng, data.len(), self.config.subsample)
                .into_iter()
                .map(|i| data[i])
                .collect()
        } else {
            data.clone()
        };
        let sample = sorted(&sample);

        let n_bins = self.config.n_bins;
        let raw: Vec<f64> = (0..=n_bins)
            .map(|i| quantile_sorted(&sample, i as f64 / n_bins as f64))
            .collect();

        let mut edges = vec![raw[0]];
        for &e in &raw[1..] {
            if e - edges[edges.len() - 1] > 1e-8 {
                edges.push(e);
            }
        }
        if edges.len() < 2 {
            edges.push(raw[raw.len() - 1]);
        }
        if edges.len() - 1 < n_bins {
            warn!(
                requested = n_bins,
                kept = edges.len() - 1,
                "bins whose width is too small were removed"
            );
        }

        let before = edges.len();
        merge_empty_bins(&mut edges, &data);
        if edges.len() < before {
            debug!(
                merged = before - edges.len(),
                "merged bins left empty by the fitting sample"
            );
        }

        self.edges = Some(edges);
        Ok(())
    }

    /// Bin of a single value.
    pub fn bin_of(&self, value: f64) -> Result<usize> {
        let edges = self.edges.as_ref().ok_or(ForecastError::FitRequired)?;
        Ok(locate(edges, value))
    }

    /// Bin of every value.
    pub fn transform(&self, values: &[f64]) -> Result<Vec<usize>> {
        let edges = self.edges.as_ref().ok_or(ForecastError::FitRequired)?;
        Ok(values.iter().map(|&v| locate(edges, v)).collect())
    }

    pub fn fit_transform(&mut self, values: &[f64]) -> Result<Vec<usize>> {
        self.fit(values)?;
        self.transform(values)
    }

    /// `(lower, upper)` of every bin, the last bin open on the right.
    pub fn bin_intervals(&self) -> Result<BTreeMap<usize, BinInterval>> {
        let edges = self.edges.as_ref().ok_or(ForecastError::FitRequired)?;
        let n_bins = edges.len() - 1;
        Ok((0..n_bins)
            .map(|i| {
                let upper = (i + 1 < n_bins).then(|| edges[i + 1]);
                (
                    i,
                    BinInterval {
                        lower: edges[i],
                        upper,
                    },
                )
            })
            .collect())
    }
}

fn locate(edges: &[f64], value: f64) -> usize {
    let n_bins = edges.len() - 1;
    let inner = &edges[1..n_bins];
    inner.partition_point(|&e| e <= value).min(n_bins - 1)
}

fn merge_empty_bins(edges: &mut Vec<f64>, data: &[f64]) {
    loop {
        let n_bins = edges.len() - 1;
        if n_bins <= 1 {
            return;
        }
        let mut counts = vec![0usize; n_bins];
        for &v in data {
            counts[locate(edges, v)] += 1;
        }
        match counts.iter().position(|&c| c == 0) {
            // Fold into the following bin, or the previous one at the end.
            Some(i) if i + 1 < n_bins => {
                edges.remove(i + 1);
            }
            Some(i) => {
                edges.remove(i);
            }
            None => return,
        }
    }
}
