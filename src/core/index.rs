//! Positional and datetime indices shared by series, frames and forecasts.

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// A single index label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexLabel {
    Position(i64),
    Timestamp(DateTime<Utc>),
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexLabel::Position(p) => write!(f, "{}", p),
            IndexLabel::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// Kind of index a series was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Range,
    Datetime,
}

/// Index of a series: either integer positions with a fixed step or
/// strictly increasing timestamps with a uniform frequency.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesIndex {
    Range { start: i64, step: i64, len: usize },
    Datetime {
        timestamps: Vec<DateTime<Utc>>,
        freq: Duration,
    },
}

impl SeriesIndex {
    /// Integer index `0..len`.
    pub fn range(len: usize) -> Self {
        SeriesIndex::Range {
            start: 0,
            step: 1,
            len,
        }
    }

    /// Build a datetime index, inferring the frequency from the spacing.
    ///
    /// Timestamps must be strictly increasing and evenly spaced.
    pub fn from_timestamps(timestamps: Vec<DateTime<Utc>>) -> Result<Self> {
        if timestamps.len() < 2 {
            return Err(ForecastError::FrequencyInference(
                "at least two timestamps are needed to infer a frequency".to_string(),
            ));
        }
        let freq = timestamps[1] - timestamps[0];
        Self::with_frequency(timestamps, freq)
    }

    /// Build a datetime index with an explicit frequency.
    pub fn with_frequency(timestamps: Vec<DateTime<Utc>>, freq: Duration) -> Result<Self> {
        if freq <= Duration::zero() {
            return Err(ForecastError::FrequencyInference(format!(
                "frequency must be positive, got {} seconds",
                freq.num_seconds()
            )));
        }
        for (i, w) in timestamps.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(ForecastError::TimestampError(
                    "timestamps must be strictly increasing".to_string(),
                ));
            }
            if w[1] - w[0] != freq {
                return Err(ForecastError::FrequencyInference(format!(
                    "irregular spacing at position {}: expected {} seconds, got {}",
                    i + 1,
                    freq.num_seconds(),
                    (w[1] - w[0]).num_seconds()
                )));
            }
        }
        Ok(SeriesIndex::Datetime { timestamps, freq })
    }

    pub fn len(&self) -> usize {
        match self {
            SeriesIndex::Range { len, .. } => *len,
            SeriesIndex::Datetime { timestamps, .. } => timestamps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            SeriesIndex::Range { .. } => IndexKind::Range,
            SeriesIndex::Datetime { .. } => IndexKind::Datetime,
        }
    }

    /// Human readable step (`"1"` for ranges, `"86400s"` for daily data).
    pub fn freq_label(&self) -> String {
        match self {
            SeriesIndex::Range { step, .. } => step.to_string(),
            SeriesIndex::Datetime { freq, .. } => format!("{}s", freq.num_seconds()),
        }
    }

    /// Label at position `i`.
    pub fn label(&self, i: usize) -> Option<IndexLabel> {
        match self {
            SeriesIndex::Range { start, step, len } => {
                (i < *len).then(|| IndexLabel::Position(start + step * i as i64))
            }
            SeriesIndex::Datetime { timestamps, .. } => {
                timestamps.get(i).copied().map(IndexLabel::Timestamp)
            }
        }
    }

    pub fn first(&self) -> Option<IndexLabel> {
        self.label(0)
    }

    pub fn last(&self) -> Option<IndexLabel> {
        self.len().checked_sub(1).and_then(|i| self.label(i))
    }

    pub fn labels(&self) -> Vec<IndexLabel> {
        (0..self.len()).filter_map(|i| self.label(i)).collect()
    }

    /// Sub-index covering positions `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> SeriesIndex {
        let end = end.min(self.len());
        let start = start.min(end);
        match self {
            SeriesIndex::Range {
                start: s, step, ..
            } => SeriesIndex::Range {
                start: s + step * start as i64,
                step: *step,
                len: end - start,
            },
            SeriesIndex::Datetime { timestamps, freq } => SeriesIndex::Datetime {
                timestamps: timestamps[start..end].to_vec(),
                freq: *freq,
            },
        }
    }

    /// Last `n` positions.
    pub fn tail(&self, n: usize) -> SeriesIndex {
        let len = self.len();
        self.slice(len.saturating_sub(n), len)
    }

    /// The `steps` labels that follow the last label.
    pub fn extend(&self, steps: usize) -> SeriesIndex {
        match self {
            SeriesIndex::Range { start, step, len } => SeriesIndex::Range {
                start: start + step * *len as i64,
                step: *step,
                len: steps,
            },
            SeriesIndex::Datetime { timestamps, freq } => {
                let timestamps = match timestamps.last() {
                    Some(last) => (1..=steps as i32).map(|k| *last + *freq * k).collect(),
                    None => Vec::new(),
                };
                SeriesIndex::Datetime {
                    timestamps,
                    freq: *freq,
                }
            }
        }
    }

    /// Same kind and same step, so one can continue the other.
    pub fn is_compatible(&self, other: &SeriesIndex) -> bool {
        match (self, other) {
            (SeriesIndex::Range { step: a, .. }, SeriesIndex::Range { step: b, .. }) => a == b,
            (SeriesIndex::Datetime { freq: a, .. }, SeriesIndex::Datetime { freq: b, .. }) => {
                a == b
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn daily(n: usize) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| base + Duration::days(i as i64)).collect()
    }

    #[test]
    fn range_index_extends_past_last_position() {
        let idx = SeriesIndex::range(10);
        let next = idx.extend(3);
        assert_eq!(
            next.labels(),
            vec![
                IndexLabel::Position(10),
                IndexLabel::Position(11),
                IndexLabel::Position(12)
            ]
        );
    }

    #[test]
    fn tail_of_range_keeps_offsets() {
        let idx = SeriesIndex::range(10).tail(3);
        assert_eq!(idx.first(), Some(IndexLabel::Position(7)));
        assert_eq!(idx.extend(1).first(), Some(IndexLabel::Position(10)));
    }

    #[test]
    fn datetime_index_infers_frequency() {
        let idx = SeriesIndex::from_timestamps(daily(5)).unwrap();
        assert_eq!(idx.freq_label(), "86400s");
        let next = idx.extend(2);
        let expected = Utc.with_ymd_and_hms(2024, 1, 7, 0, 0, 0).unwrap();
        assert_eq!(next.last(), Some(IndexLabel::Timestamp(expected)));
    }

    #[test]
    fn irregular_timestamps_are_rejected() {
        let mut ts = daily(5);
        ts[3] += Duration::hours(1);
        assert!(matches!(
            SeriesIndex::from_timestamps(ts),
            Err(ForecastError::FrequencyInference(_))
        ));
    }

    #[test]
    fn decreasing_timestamps_are_rejected() {
        let mut ts = daily(3);
        ts.swap(1, 2);
        assert!(SeriesIndex::with_frequency(ts, Duration::days(1)).is_err());
    }

    #[test]
    fn compatibility_requires_same_kind_and_step() {
        let a = SeriesIndex::range(4);
        let b = SeriesIndex::from_timestamps(daily(4)).unwrap();
        assert!(a.is_compatible(&SeriesIndex::range(2)));
        assert!(!a.is_compatible(&b));
    }
}
