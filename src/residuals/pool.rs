//! Bounded residual storage: flat pools, per-bin pools and per-step pools.
//!
//! Replacing a pool wholesale down-samples without replacement to the cap;
//! appending only fills the free space left under the cap.

use super::binner::QuantileBinner;
use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tracing::warn;

/// Cap of a flat residual pool.
pub const MAX_FLAT_RESIDUALS: usize = 1_000;
/// Cap of each per-bin residual pool.
pub const MAX_RESIDUALS_PER_BIN: usize = 200;
/// Seed used when down-sampling in-sample residual bins.
pub const IN_SAMPLE_BIN_SEED: u64 = 95_123;
/// Seed used when down-sampling in-sample per-step residuals.
pub const IN_SAMPLE_STEP_SEED: u64 = 123;

/// Keep at most `cap` values, sampled without replacement.
pub fn downsample(values: &[f64], cap: usize, seed: u64) -> Vec<f64> {
    if values.len() <= cap {
        return values.to_vec();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, values.len(), cap)
        .into_iter()
        .map(|i| values[i])
        .collect()
}

/// Append `new` to `existing` without exceeding `cap`.
fn append_free_space(existing: &mut Vec<f64>, new: &[f64], cap: usize) {
    let free = cap.saturating_sub(existing.len());
    existing.extend_from_slice(&new[..free.min(new.len())]);
}

/// Residuals grouped by the bin of the prediction they were paired with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinnedResiduals {
    bins: BTreeMap<usize, Vec<f64>>,
}

impl BinnedResiduals {
    /// Group `residuals` by the bin of `predictions`.
    pub fn group(
        residuals: &[f64],
        predictions: &[f64],
        binner: &QuantileBinner,
    ) -> Result<Self> {
        if residuals.len() != predictions.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: predictions.len(),
                got: residuals.len(),
            });
        }
        let mut bins: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
        for (bin, r) in binner.transform(predictions)?.into_iter().zip(residuals) {
            bins.entry(bin).or_default().push(*r);
        }
        Ok(Self { bins })
    }

    /// Down-sample every bin over `cap`, each with a fresh generator.
    pub fn cap(&mut self, cap: usize, seed: u64) {
        for values in self.bins.values_mut() {
            if values.len() > cap {
                *values = downsample(values, cap, seed);
            }
        }
    }

    /// Append bin by bin, filling only the free space under `cap`.
    pub fn append(&mut self, other: BinnedResiduals, cap: usize) {
        for (bin, values) in other.bins {
            match self.bins.get_mut(&bin) {
                Some(existing) => append_free_space(existing, &values, cap),
                None => {
                    self.bins.insert(bin, values);
                }
            }
        }
    }

    /// Give every bin in `0..n_bins` that has no residuals `size` values
    /// drawn with replacement from `source`. Returns the filled bins.
    pub fn fill_empty_bins(
        &mut self,
        n_bins: usize,
        source: &[f64],
        size: usize,
        seed: u64,
    ) -> Result<Vec<usize>> {
        let empty: Vec<usize> = (0..n_bins)
            .filter(|b| self.bins.get(b).is_none_or(|v| v.is_empty()))
            .collect();
        if empty.is_empty() {
            return Ok(empty);
        }
        if source.is_empty() {
            return Err(ForecastError::ResidualsUnavailable(
                "cannot fill empty bins from an empty residual pool".to_string(),
            ));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        for &bin in &empty {
            let drawn = (0..size)
                .map(|_| source[rng.gen_range(0..source.len())])
                .collect();
            self.bins.insert(bin, drawn);
        }
        Ok(empty)
    }

    pub fn get(&self, bin: usize) -> Option<&[f64]> {
        self.bins.get(&bin).map(|v| v.as_slice())
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[f64])> {
        self.bins.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// All residuals concatenated in bin order.
    pub fn flatten(&self) -> Vec<f64> {
        self.bins.values().flatten().copied().collect()
    }

    pub fn total_len(&self) -> usize {
        self.bins.values().map(|v| v.len()).sum()
    }
}

/// In-sample and out-of-sample residual pools of a single-model forecaster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualPools {
    in_sample: Option<Vec<f64>>,
    in_sample_by_bin: Option<BinnedResiduals>,
    out_sample: Option<Vec<f64>>,
    out_sample_by_bin: Option<BinnedResiduals>,
}

impl ResidualPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store training residuals, binned by their predictions. The flat pool
    /// is the concatenation of the capped bins.
    pub fn set_in_sample(
        &mut self,
        residuals: &[f64],
        predictions: &[f64],
        binner: &QuantileBinner,
    ) -> Result<()> {
        let mut by_bin = BinnedResiduals::group(residuals, predictions, binner)?;
        by_bin.cap(MAX_RESIDUALS_PER_BIN, IN_SAMPLE_BIN_SEED);
        self.in_sample = Some(by_bin.flatten());
        self.in_sample_by_bin = Some(by_bin);
        Ok(())
    }

    pub fn clear_in_sample(&mut self) {
        self.in_sample = None;
        self.in_sample_by_bin = None;
    }

    /// Install flat out-of-sample residuals.
    pub fn set_out_sample(&mut self, residuals: &[f64], append: bool, seed: u64) {
        let new = downsample(residuals, MAX_FLAT_RESIDUALS, seed);
        match (&mut self.out_sample, append) {
            (Some(existing), true) => append_free_space(existing, &new, MAX_FLAT_RESIDUALS),
            _ => self.out_sample = Some(new),
        }
    }

    /// Install out-of-sample residuals binned by their predictions.
    ///
    /// Bins over the cap are down-sampled, the flat pool becomes the
    /// concatenation of the bins, and bins left empty are back-filled from
    /// that flat pool with a warning.
    pub fn set_out_sample_binned(
        &mut self,
        residuals: &[f64],
        predictions: &[f64],
        binner: &QuantileBinner,
        append: bool,
        seed: u64,
    ) -> Result<()> {
        let new = BinnedResiduals::group(residuals, predictions, binner)?;
        let mut by_bin = match (self.out_sample_by_bin.take(), append) {
            (Some(mut existing), true) => {
                existing.append(new, MAX_RESIDUALS_PER_BIN);
                existing
            }
            _ => new,
        };
        by_bin.cap(MAX_RESIDUALS_PER_BIN, seed);
        let flat = by_bin.flatten();

        let filled = by_bin.fill_empty_bins(binner.n_bins(), &flat, MAX_RESIDUALS_PER_BIN, seed)?;
        if !filled.is_empty() {
            let intervals = binner.bin_intervals()?;
            let described: Vec<String> = filled
                .iter()
                .map(|b| match intervals.get(b) {
                    Some(i) => match i.upper {
                        Some(u) => format!("{}: ({}, {})", b, i.lower, u),
                        None => format!("{}: ({}, None)", b, i.lower),
                    },
                    None => b.to_string(),
                })
                .collect();
            warn!(
                bins = ?filled,
                intervals = %described.join(", "),
                "bins without out-of-sample residuals were filled with {} values sampled \
                 with replacement from all out-of-sample residuals",
                MAX_RESIDUALS_PER_BIN
            );
        }

        self.out_sample = Some(flat);
        self.out_sample_by_bin = Some(by_bin);
        Ok(())
    }

    pub fn in_sample(&self) -> Option<&[f64]> {
        self.in_sample.as_deref()
    }

    pub fn in_sample_by_bin(&self) -> Option<&BinnedResiduals> {
        self.in_sample_by_bin.as_ref()
    }

    pub fn out_sample(&self) -> Option<&[f64]> {
        self.out_sample.as_deref()
    }

    pub fn out_sample_by_bin(&self) -> Option<&BinnedResiduals> {
        self.out_sample_by_bin.as_ref()
    }

    /// Flat pool for bootstrapping, failing if it is unset or empty.
    pub fn flat(&self, use_in_sample: bool) -> Result<&[f64]> {
        let (pool, label) = if use_in_sample {
            (self.in_sample(), "in-sample")
        } else {
            (self.out_sample(), "out-of-sample")
        };
        match pool {
            Some(p) if !p.is_empty() => Ok(p),
            _ => Err(ForecastError::ResidualsUnavailable(format!(
                "no {} residuals stored; fit with store_in_sample_residuals or call \
                 set_out_sample_residuals",
                label
            ))),
        }
    }

    /// Binned pool for bootstrapping, failing if it is unset.
    pub fn binned(&self, use_in_sample: bool) -> Result<&BinnedResiduals> {
        let (pool, label) = if use_in_sample {
            (self.in_sample_by_bin(), "in-sample")
        } else {
            (self.out_sample_by_bin(), "out-of-sample")
        };
        pool.ok_or_else(|| {
            ForecastError::ResidualsUnavailable(format!(
                "no {} residuals by bin stored; out-of-sample bins require \
                 set_out_sample_residuals with predictions",
                label
            ))
        })
    }
}

/// Residuals of a direct forecaster, one pool per horizon.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResiduals {
    steps: BTreeMap<usize, Vec<f64>>,
}

impl StepResiduals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pool of `step`, down-sampling to the flat cap.
    pub fn insert(&mut self, step: usize, residuals: &[f64], seed: u64) {
        self.steps
            .insert(step, downsample(residuals, MAX_FLAT_RESIDUALS, seed));
    }

    /// Append to the pool of `step`, filling only the free space.
    pub fn append(&mut self, step: usize, residuals: &[f64], seed: u64) {
        let new = downsample(residuals, MAX_FLAT_RESIDUALS, seed);
        match self.steps.get_mut(&step) {
            Some(existing) => append_free_space(existing, &new, MAX_FLAT_RESIDUALS),
            None => {
                self.steps.insert(step, new);
            }
        }
    }

    pub fn get(&self, step: usize) -> Option<&[f64]> {
        self.steps.get(&step).map(|v| v.as_slice())
    }

    pub fn steps(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Pool of `step` for bootstrapping: present, non-empty and NaN free.
    pub fn for_bootstrap(&self, step: usize) -> Result<&[f64]> {
        match self.steps.get(&step) {
            None => Err(ForecastError::ResidualsUnavailable(format!(
                "no residuals stored for step {}",
                step
            ))),
            Some(v) if v.is_empty() => Err(ForecastError::ResidualsUnavailable(format!(
                "residuals for step {} are empty",
                step
            ))),
            Some(v) if v.iter().any(|r| r.is_nan()) => Err(ForecastError::ResidualsUnavailable(
                format!("residuals for step {} contain NaN values", step),
            )),
            Some(v) => Ok(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::residuals::BinnerConfig;

    fn fitted_binner(values: &[f64], n_bins: usize) -> QuantileBinner {
        let mut b = QuantileBinner::new(BinnerConfig::new(n_bins)).unwrap();
        b.fit(values).unwrap();
        b
    }

    #[test]
    fn downsample_is_seeded_and_capped() {
        let values: Vec<f64> = (0..50).map(|v| v as f64).collect();
        let a = downsample(&values, 10, 7);
        let b = downsample(&values, 10, 7);
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);
        let mut unique = a.clone();
        unique.sort_by(|x, y| x.partial_cmp(y).unwrap());
        unique.dedup();
        assert_eq!(unique.len(), 10);
        assert_eq!(downsample(&values[..5], 10, 7), values[..5].to_vec());
    }

    #[test]
    fn in_sample_bins_cover_every_bin_and_sum_to_flat() {
        let preds: Vec<f64> = (0..3000).map(|v| v as f64).collect();
        let residuals: Vec<f64> = preds.iter().map(|p| p * 0.01).collect();
        let binner = fitted_binner(&preds, 10);
        let mut pools = ResidualPools::new();
        pools.set_in_sample(&residuals, &preds, &binner).unwrap();

        let by_bin = pools.in_sample_by_bin().unwrap();
        assert_eq!(by_bin.n_bins(), 10);
        for (_, values) in by_bin.iter() {
            assert!(!values.is_empty());
            assert!(values.len() <= MAX_RESIDUALS_PER_BIN);
        }
        assert_eq!(by_bin.total_len(), pools.in_sample().unwrap().len());
    }

    #[test]
    fn flat_out_sample_append_fills_only_free_space() {
        let mut pools = ResidualPools::new();
        pools.set_out_sample(&vec![1.0; 900], false, 123);
        pools.set_out_sample(&vec![2.0; 300], true, 123);
        let flat = pools.out_sample().unwrap();
        assert_eq!(flat.len(), MAX_FLAT_RESIDUALS);
        assert_eq!(flat.iter().filter(|&&v| v == 2.0).count(), 100);

        pools.set_out_sample(&vec![3.0; 5000], false, 123);
        assert_eq!(pools.out_sample().unwrap().len(), MAX_FLAT_RESIDUALS);
    }

    /// Log sink shared with a scoped subscriber.
    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn backfilled_bins_are_logged_with_their_intervals() {
        let preds: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let binner = fitted_binner(&preds, 4);
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .without_time()
            .finish();

        let mut pools = ResidualPools::new();
        tracing::subscriber::with_default(subscriber, || {
            pools
                .set_out_sample_binned(&[0.1, 0.2], &[1.0, 30.0], &binner, false, 5)
                .unwrap();
        });

        let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let intervals = binner.bin_intervals().unwrap();
        let upper_of_2 = intervals[&2].upper.unwrap();
        assert!(logs.contains("WARN"));
        assert!(logs.contains("bins=[2, 3]"));
        assert!(logs.contains(&format!("2: ({}, {})", intervals[&2].lower, upper_of_2)));
        assert!(logs.contains(&format!("3: ({}, None)", intervals[&3].lower)));

        // Nothing to fill, nothing logged.
        let quiet = Captured::default();
        let sink = quiet.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish();
        let all_bins: Vec<f64> = vec![1.0, 30.0, 60.0, 90.0];
        tracing::subscriber::with_default(subscriber, || {
            pools
                .set_out_sample_binned(&[0.1, 0.2, 0.3, 0.4], &all_bins, &binner, false, 5)
                .unwrap();
        });
        assert!(quiet.0.lock().unwrap().is_empty());
    }

    #[test]
    fn binned_out_sample_backfills_empty_bins() {
        let preds: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let binner = fitted_binner(&preds, 4);
        // Only low predictions, so the upper bins stay empty.
        let new_preds = vec![1.0, 2.0, 3.0, 30.0];
        let residuals = vec![0.1, 0.2, 0.3, 0.4];
        let mut pools = ResidualPools::new();
        pools
            .set_out_sample_binned(&residuals, &new_preds, &binner, false, 123)
            .unwrap();

        let by_bin = pools.out_sample_by_bin().unwrap();
        assert_eq!(by_bin.get(0).unwrap().len(), 3);
        assert_eq!(by_bin.get(1).unwrap().len(), 1);
        for bin in 2..4 {
            let values = by_bin.get(bin).unwrap();
            assert_eq!(values.len(), MAX_RESIDUALS_PER_BIN);
            assert!(values.iter().all(|v| residuals.contains(v)));
        }
        assert_eq!(pools.out_sample().unwrap().len(), 4);
    }

    #[test]
    fn binned_out_sample_caps_each_bin() {
        let preds: Vec<f64> = (0..100).map(|v| v as f64).collect();
        let binner = fitted_binner(&preds, 2);
        let new_preds: Vec<f64> = (0..1000).map(|v| (v % 100) as f64).collect();
        let residuals: Vec<f64> = (0..1000).map(|v| v as f64).collect();
        let mut pools = ResidualPools::new();
        pools
            .set_out_sample_binned(&residuals, &new_preds, &binner, false, 1)
            .unwrap();
        let by_bin = pools.out_sample_by_bin().unwrap();
        assert_eq!(by_bin.get(0).unwrap().len(), MAX_RESIDUALS_PER_BIN);
        assert_eq!(by_bin.get(1).unwrap().len(), MAX_RESIDUALS_PER_BIN);
        assert_eq!(pools.out_sample().unwrap().len(), 2 * MAX_RESIDUALS_PER_BIN);
    }

    #[test]
    fn missing_pools_are_reported() {
        let pools = ResidualPools::new();
        assert!(matches!(
            pools.flat(false),
            Err(ForecastError::ResidualsUnavailable(_))
        ));
        assert!(matches!(
            pools.binned(true),
            Err(ForecastError::ResidualsUnavailable(_))
        ));
    }

    #[test]
    fn step_residuals_validation() {
        let mut steps = StepResiduals::new();
        steps.insert(1, &[0.5, -0.5], 123);
        steps.insert(2, &[f64::NAN], 123);
        assert_eq!(steps.for_bootstrap(1).unwrap(), &[0.5, -0.5]);
        assert!(steps.for_bootstrap(2).is_err());
        assert!(steps.for_bootstrap(3).is_err());

        steps.append(1, &vec![1.0; 2000], 123);
        assert_eq!(steps.get(1).unwrap().len(), MAX_FLAT_RESIDUALS);
    }
}
