//! In-process global store
//!
//! A reference [`GlobalStore`] backed by guarded maps. It keeps every
//! recorded time-series sample verbatim rather than rolling them up, which
//! makes it exact, queryable, and well suited to tests and to small
//! processes that do not need a multi-level rollup store.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use crate::histogram::BucketedHistogram;
use crate::store::{ExportType, GlobalStore, StoreError};

/// One aggregated sample recorded into a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSeriesSample {
    /// Sum of the values accumulated between two flushes.
    pub sum: i64,
    /// Number of values accumulated between two flushes.
    pub count: u64,
    /// Flush timestamp, seconds since the Unix epoch.
    pub timestamp: u64,
}

enum Entry {
    Counter(i64),
    TimeSeries {
        samples: Vec<TimeSeriesSample>,
        exports: BTreeSet<ExportType>,
    },
    Histogram {
        buckets: BucketedHistogram,
        percentiles: BTreeSet<u8>,
        exports: BTreeSet<ExportType>,
    },
}

impl Entry {
    fn kind_mismatch(name: &str) -> StoreError {
        StoreError::KindMismatch {
            name: name.to_string(),
        }
    }
}

/// In-memory [`GlobalStore`] implementation with query accessors.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a named counter, if established.
    pub fn counter_value(&self, name: &str) -> Option<i64> {
        match self.entries.read().get(name) {
            Some(Entry::Counter(value)) => Some(*value),
            _ => None,
        }
    }

    /// All samples recorded into a named time series, if established.
    pub fn time_series_samples(&self, name: &str) -> Option<Vec<TimeSeriesSample>> {
        match self.entries.read().get(name) {
            Some(Entry::TimeSeries { samples, .. }) => Some(samples.clone()),
            _ => None,
        }
    }

    /// Export kinds currently published for a named time series.
    pub fn time_series_exports(&self, name: &str) -> Option<Vec<ExportType>> {
        match self.entries.read().get(name) {
            Some(Entry::TimeSeries { exports, .. }) => {
                Some(exports.iter().copied().collect())
            }
            _ => None,
        }
    }

    /// Bucket counts of a named histogram (under-range bucket first,
    /// over-range bucket last), if established.
    pub fn histogram_buckets(&self, name: &str) -> Option<Vec<u64>> {
        match self.entries.read().get(name) {
            Some(Entry::Histogram { buckets, .. }) => Some(buckets.counts().to_vec()),
            _ => None,
        }
    }

    /// Percentiles currently published for a named histogram.
    pub fn percentile_exports(&self, name: &str) -> Option<Vec<u8>> {
        match self.entries.read().get(name) {
            Some(Entry::Histogram { percentiles, .. }) => {
                Some(percentiles.iter().copied().collect())
            }
            _ => None,
        }
    }

    /// Export kinds currently published for a named histogram.
    pub fn histogram_stat_exports(&self, name: &str) -> Option<Vec<ExportType>> {
        match self.entries.read().get(name) {
            Some(Entry::Histogram { exports, .. }) => {
                Some(exports.iter().copied().collect())
            }
            _ => None,
        }
    }
}

impl GlobalStore for MemoryStore {
    fn establish_counter(&self, name: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get(name) {
            None => {
                entries.insert(name.to_string(), Entry::Counter(0));
                Ok(())
            }
            Some(Entry::Counter(_)) => Ok(()),
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn establish_time_series(&self, name: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get(name) {
            None => {
                entries.insert(
                    name.to_string(),
                    Entry::TimeSeries {
                        samples: Vec::new(),
                        exports: BTreeSet::new(),
                    },
                );
                Ok(())
            }
            Some(Entry::TimeSeries { .. }) => Ok(()),
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn establish_histogram(
        &self,
        name: &str,
        bucket_width: u64,
        min: i64,
        max: i64,
    ) -> Result<(), StoreError> {
        let buckets = BucketedHistogram::new(bucket_width, min, max).map_err(|_| {
            StoreError::ShapeMismatch {
                name: name.to_string(),
            }
        })?;
        let mut entries = self.entries.write();
        match entries.get(name) {
            None => {
                entries.insert(
                    name.to_string(),
                    Entry::Histogram {
                        buckets,
                        percentiles: BTreeSet::new(),
                        exports: BTreeSet::new(),
                    },
                );
                Ok(())
            }
            Some(Entry::Histogram { buckets: existing, .. }) => {
                if existing.bucket_width() == bucket_width
                    && existing.min() == min
                    && existing.max() == max
                {
                    Ok(())
                } else {
                    Err(StoreError::ShapeMismatch {
                        name: name.to_string(),
                    })
                }
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn add_to_counter(&self, name: &str, delta: i64) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Entry::Counter(value)) => {
                *value = value.wrapping_add(delta);
                Ok(())
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn record_time_series_sample(
        &self,
        name: &str,
        sum: i64,
        count: u64,
        timestamp: u64,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Entry::TimeSeries { samples, .. }) => {
                samples.push(TimeSeriesSample {
                    sum,
                    count,
                    timestamp,
                });
                Ok(())
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn configure_exports(&self, name: &str, kinds: &[ExportType]) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Entry::TimeSeries { exports, .. }) => {
                exports.extend(kinds.iter().copied());
                Ok(())
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn retract_exports(&self, name: &str, kinds: &[ExportType]) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Entry::TimeSeries { exports, .. }) => {
                for kind in kinds {
                    exports.remove(kind);
                }
                Ok(())
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn merge_histogram_buckets(
        &self,
        name: &str,
        bucket_deltas: &[u64],
        _timestamp: u64,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Entry::Histogram { buckets, .. }) => {
                if bucket_deltas.len() != buckets.num_buckets() {
                    return Err(StoreError::ShapeMismatch {
                        name: name.to_string(),
                    });
                }
                buckets.add_counts(bucket_deltas);
                Ok(())
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn configure_percentile_exports(
        &self,
        name: &str,
        percentiles: &[u8],
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Entry::Histogram { percentiles: set, .. }) => {
                set.extend(percentiles.iter().copied());
                Ok(())
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn retract_percentile_exports(
        &self,
        name: &str,
        percentiles: &[u8],
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Entry::Histogram { percentiles: set, .. }) => {
                for pct in percentiles {
                    set.remove(pct);
                }
                Ok(())
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn configure_histogram_exports(
        &self,
        name: &str,
        kinds: &[ExportType],
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Entry::Histogram { exports, .. }) => {
                exports.extend(kinds.iter().copied());
                Ok(())
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }

    fn retract_histogram_exports(
        &self,
        name: &str,
        kinds: &[ExportType],
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            None => Err(StoreError::NotFound(name.to_string())),
            Some(Entry::Histogram { exports, .. }) => {
                for kind in kinds {
                    exports.remove(kind);
                }
                Ok(())
            }
            Some(_) => Err(Entry::kind_mismatch(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_establish_and_add() {
        let store = MemoryStore::new();

        store.establish_counter("hits").unwrap();
        assert_eq!(store.counter_value("hits"), Some(0));

        store.add_to_counter("hits", 10).unwrap();
        store.add_to_counter("hits", -3).unwrap();
        assert_eq!(store.counter_value("hits"), Some(7));

        // Re-establishing is a no-op and keeps the value.
        store.establish_counter("hits").unwrap();
        assert_eq!(store.counter_value("hits"), Some(7));
    }

    #[test]
    fn test_unestablished_names_fail() {
        let store = MemoryStore::new();

        assert!(matches!(
            store.add_to_counter("missing", 1),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.record_time_series_sample("missing", 1, 1, 0),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.merge_histogram_buckets("missing", &[0, 1, 0], 0),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.configure_exports("missing", &[ExportType::Avg]),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_kind_mismatch() {
        let store = MemoryStore::new();
        store.establish_counter("x").unwrap();

        assert!(matches!(
            store.establish_time_series("x"),
            Err(StoreError::KindMismatch { .. })
        ));
        assert!(matches!(
            store.establish_histogram("x", 10, 0, 100),
            Err(StoreError::KindMismatch { .. })
        ));
        assert!(matches!(
            store.record_time_series_sample("x", 1, 1, 0),
            Err(StoreError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_histogram_shape_mismatch() {
        let store = MemoryStore::new();
        store.establish_histogram("lat", 10, 0, 100).unwrap();

        // Same shape is fine.
        store.establish_histogram("lat", 10, 0, 100).unwrap();

        assert!(matches!(
            store.establish_histogram("lat", 20, 0, 100),
            Err(StoreError::ShapeMismatch { .. })
        ));

        // 10 value buckets plus under/over = 12; a short merge is rejected.
        assert!(matches!(
            store.merge_histogram_buckets("lat", &[0; 5], 0),
            Err(StoreError::ShapeMismatch { .. })
        ));
        store.merge_histogram_buckets("lat", &[1; 12], 0).unwrap();
        assert_eq!(store.histogram_buckets("lat"), Some(vec![1; 12]));
    }

    #[test]
    fn test_time_series_samples_and_exports() {
        let store = MemoryStore::new();
        store.establish_time_series("lat").unwrap();

        store.record_time_series_sample("lat", 60, 3, 1000).unwrap();
        store.record_time_series_sample("lat", 10, 1, 1001).unwrap();

        let samples = store.time_series_samples("lat").unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].sum, 60);
        assert_eq!(samples[0].count, 3);
        assert_eq!(samples[0].timestamp, 1000);

        store
            .configure_exports("lat", &[ExportType::Avg, ExportType::Rate])
            .unwrap();
        assert_eq!(
            store.time_series_exports("lat"),
            Some(vec![ExportType::Avg, ExportType::Rate])
        );

        store.retract_exports("lat", &[ExportType::Rate]).unwrap();
        assert_eq!(
            store.time_series_exports("lat"),
            Some(vec![ExportType::Avg])
        );
    }

    #[test]
    fn test_percentile_exports() {
        let store = MemoryStore::new();
        store.establish_histogram("lat", 100, 0, 5000).unwrap();

        store
            .configure_percentile_exports("lat", &[50, 95, 99])
            .unwrap();
        assert_eq!(store.percentile_exports("lat"), Some(vec![50, 95, 99]));

        store.retract_percentile_exports("lat", &[95]).unwrap();
        assert_eq!(store.percentile_exports("lat"), Some(vec![50, 99]));
    }
}
