//! Thread-local time-series stat
//!
//! Accumulates a running `(sum, count)` locally; each flush records the
//! pair as one sample at the sweep timestamp into the named rolling series
//! in the global store, then resets the local state. Derived statistics
//! (average, rate, ...) are computed by the global series from the
//! recorded samples, never by the local object.

use std::sync::{Arc, Weak};

use crate::container::ThreadLocalStats;
use crate::error::StatsError;
use crate::locking::{LockPolicy, SingleThread};
use crate::stat::{AnyStat, StatCore};
use crate::store::{ExportType, GlobalStore, StoreError};

#[derive(Default)]
struct Accumulator {
    sum: i64,
    count: u64,
}

struct TimeseriesInner<P: LockPolicy> {
    core: StatCore<P>,
    local: P::Cell<Accumulator>,
}

impl<P: LockPolicy> AnyStat for TimeseriesInner<P> {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn flush(&self, store: &dyn GlobalStore, now: u64) -> Result<(), StoreError> {
        let taken = P::with_cell(&self.local, std::mem::take);
        if taken.sum == 0 && taken.count == 0 {
            // No data arrived since the last sweep; recording nothing
            // keeps repeated aggregation idempotent.
            return Ok(());
        }
        if let Err(err) =
            store.record_time_series_sample(self.core.name(), taken.sum, taken.count, now)
        {
            P::with_cell(&self.local, |local| {
                local.sum += taken.sum;
                local.count += taken.count;
            });
            return Err(err);
        }
        Ok(())
    }

    fn detach(&self) {
        self.core.detach();
    }
}

/// A thread-local accumulator for a named rolling time series.
///
/// Dropping the stat unregisters it; a `(sum, count)` accumulated since
/// the last flush is discarded, so aggregate before dropping if it
/// matters.
pub struct TlTimeseries<P: LockPolicy = SingleThread> {
    inner: Arc<TimeseriesInner<P>>,
}

impl<P: LockPolicy> TlTimeseries<P> {
    /// Create a time series, establishing the global series of the same
    /// name.
    pub fn new(
        stats: &ThreadLocalStats<P>,
        name: impl Into<String>,
    ) -> Result<Self, StatsError> {
        Self::with_exports(stats, name, &[])
    }

    /// Create a time series and declare the derived statistics the global
    /// series should publish.
    pub fn with_exports(
        stats: &ThreadLocalStats<P>,
        name: impl Into<String>,
        exports: &[ExportType],
    ) -> Result<Self, StatsError> {
        let name = name.into();
        stats.store().establish_time_series(&name)?;
        if !exports.is_empty() {
            stats.store().configure_exports(&name, exports)?;
        }
        let inner = Arc::new(TimeseriesInner {
            core: StatCore::new(stats, name),
            local: P::new_cell(Accumulator::default(), stats.witness()),
        });
        let weak = Arc::downgrade(&inner);
        let entry: Weak<dyn AnyStat> = weak;
        inner.core.register(stats, entry);
        Ok(Self { inner })
    }

    /// The series' name in the global store.
    pub fn name(&self) -> &str {
        self.inner.core.name()
    }

    /// Add one data point.
    #[inline]
    pub fn add_value(&self, value: i64) {
        P::with_cell(&self.inner.local, |local| {
            local.sum += value;
            local.count += 1;
        });
    }

    /// Add a pre-aggregated batch: `value` is the sum of `nsamples`
    /// data points.
    #[inline]
    pub fn add_value_aggregated(&self, value: i64, nsamples: u64) {
        P::with_cell(&self.inner.local, |local| {
            local.sum += value;
            local.count += nsamples;
        });
    }

    /// Local sum accumulated since the last flush.
    pub fn sum(&self) -> i64 {
        P::with_cell(&self.inner.local, |local| local.sum)
    }

    /// Local sample count accumulated since the last flush.
    pub fn count(&self) -> u64 {
        P::with_cell(&self.inner.local, |local| local.count)
    }

    /// Publish an additional derived statistic from the global series.
    ///
    /// Fails with [`StatsError::Detached`] if the owning container has
    /// been destroyed and not reassigned.
    pub fn export_stat(&self, kind: ExportType) -> Result<(), StatsError> {
        let container = self.inner.core.container("exporting a stat")?;
        container
            .store()
            .configure_exports(self.inner.core.name(), &[kind])?;
        Ok(())
    }

    /// Stop publishing a derived statistic from the global series.
    pub fn unexport_stat(&self, kind: ExportType) -> Result<(), StatsError> {
        let container = self.inner.core.container("unexporting a stat")?;
        container
            .store()
            .retract_exports(self.inner.core.name(), &[kind])?;
        Ok(())
    }
}

impl<P: LockPolicy> Drop for TlTimeseries<P> {
    fn drop(&mut self) {
        self.inner.core.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_local_accumulation() {
        let store = Arc::new(MemoryStore::new());
        let stats: ThreadLocalStats = ThreadLocalStats::new(store);
        let series = TlTimeseries::new(&stats, "lat").unwrap();

        series.add_value(10);
        series.add_value(20);
        series.add_value_aggregated(45, 3);

        assert_eq!(series.sum(), 75);
        assert_eq!(series.count(), 5);
    }

    #[test]
    fn test_flush_records_one_sample() {
        let store = Arc::new(MemoryStore::new());
        let stats: ThreadLocalStats = ThreadLocalStats::new(store.clone());
        let series = TlTimeseries::new(&stats, "lat").unwrap();

        series.add_value(10);
        series.add_value(20);
        series.add_value(30);
        stats.aggregate_at(1234);

        let samples = store.time_series_samples("lat").unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].sum, 60);
        assert_eq!(samples[0].count, 3);
        assert_eq!(samples[0].timestamp, 1234);

        assert_eq!(series.sum(), 0);
        assert_eq!(series.count(), 0);
    }

    #[test]
    fn test_empty_flush_records_nothing() {
        let store = Arc::new(MemoryStore::new());
        let stats: ThreadLocalStats = ThreadLocalStats::new(store.clone());
        let _series = TlTimeseries::new(&stats, "lat").unwrap();

        stats.aggregate_at(1);
        stats.aggregate_at(2);

        assert_eq!(store.time_series_samples("lat").unwrap().len(), 0);
    }

    #[test]
    fn test_exports_declared_at_construction() {
        let store = Arc::new(MemoryStore::new());
        let stats: ThreadLocalStats = ThreadLocalStats::new(store.clone());
        let series =
            TlTimeseries::with_exports(&stats, "lat", &[ExportType::Sum, ExportType::Rate])
                .unwrap();

        assert_eq!(
            store.time_series_exports("lat"),
            Some(vec![ExportType::Sum, ExportType::Rate])
        );

        series.export_stat(ExportType::Avg).unwrap();
        series.unexport_stat(ExportType::Rate).unwrap();
        assert_eq!(
            store.time_series_exports("lat"),
            Some(vec![ExportType::Sum, ExportType::Avg])
        );
    }
}
