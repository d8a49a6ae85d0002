//! Thread-local histogram stat
//!
//! The local state is a fixed-width bucketed histogram over a closed value
//! range plus a dirty flag. Flushing merges the local bucket counts into
//! the same-shaped global histogram and clears them; a clean histogram is
//! skipped entirely, so repeated sweeps with no new data never touch the
//! store.

use std::sync::{Arc, Weak};

use crate::container::ThreadLocalStats;
use crate::error::StatsError;
use crate::locking::{LockPolicy, SingleThread};
use crate::stat::{AnyStat, StatCore};
use crate::store::{ExportType, GlobalStore, StoreError};

/// A fixed-width bucketed histogram over `[min, max)`.
///
/// The bucket layout is: one under-range bucket for values below `min`,
/// `ceil((max - min) / bucket_width)` value buckets, and one over-range
/// bucket for values at or above `max`.
#[derive(Debug, Clone)]
pub struct BucketedHistogram {
    bucket_width: u64,
    min: i64,
    max: i64,
    buckets: Vec<u64>,
}

impl BucketedHistogram {
    /// Create an empty histogram. The bucket width must be non-zero and
    /// the range non-empty.
    pub fn new(bucket_width: u64, min: i64, max: i64) -> Result<Self, StatsError> {
        if bucket_width == 0 || max <= min {
            return Err(StatsError::InvalidHistogram {
                bucket_width,
                min,
                max,
            });
        }
        let span = (max as i128 - min as i128) as u128;
        let width = bucket_width as u128;
        let value_buckets = ((span + width - 1) / width) as usize;
        Ok(Self {
            bucket_width,
            min,
            max,
            buckets: vec![0; value_buckets + 2],
        })
    }

    /// Width of each value bucket.
    pub fn bucket_width(&self) -> u64 {
        self.bucket_width
    }

    /// Inclusive lower bound of the bucketed range.
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Exclusive upper bound of the bucketed range.
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Total number of buckets, including the under/over-range buckets.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    fn index_for(&self, value: i64) -> usize {
        if value < self.min {
            0
        } else if value >= self.max {
            self.buckets.len() - 1
        } else {
            let offset = (value as i128 - self.min as i128) as u128;
            1 + (offset / self.bucket_width as u128) as usize
        }
    }

    /// Count one sample.
    #[inline]
    pub fn add_value(&mut self, value: i64) {
        self.add_repeated_value(value, 1);
    }

    /// Count `nsamples` identical samples.
    #[inline]
    pub fn add_repeated_value(&mut self, value: i64, nsamples: u64) {
        let index = self.index_for(value);
        self.buckets[index] += nsamples;
    }

    /// Merge per-bucket deltas from a same-shaped histogram.
    ///
    /// # Panics
    ///
    /// Panics if `deltas` does not match this histogram's bucket count.
    pub fn add_counts(&mut self, deltas: &[u64]) {
        assert_eq!(deltas.len(), self.buckets.len(), "bucket layout mismatch");
        for (bucket, delta) in self.buckets.iter_mut().zip(deltas) {
            *bucket += delta;
        }
    }

    /// Per-bucket counts (under-range first, over-range last).
    pub fn counts(&self) -> &[u64] {
        &self.buckets
    }

    /// Total number of samples across all buckets.
    pub fn total_count(&self) -> u64 {
        self.buckets.iter().sum()
    }

    /// Reset every bucket to zero.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = 0;
        }
    }
}

struct HistogramLocal {
    buckets: BucketedHistogram,
    dirty: bool,
}

struct HistogramInner<P: LockPolicy> {
    core: StatCore<P>,
    local: P::Cell<HistogramLocal>,
}

impl<P: LockPolicy> AnyStat for HistogramInner<P> {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn flush(&self, store: &dyn GlobalStore, now: u64) -> Result<(), StoreError> {
        let taken = P::with_cell(&self.local, |local| {
            if !local.dirty {
                return None;
            }
            local.dirty = false;
            let counts = local.buckets.counts().to_vec();
            local.buckets.clear();
            Some(counts)
        });
        let Some(counts) = taken else {
            return Ok(());
        };
        if let Err(err) = store.merge_histogram_buckets(self.core.name(), &counts, now) {
            P::with_cell(&self.local, |local| {
                local.buckets.add_counts(&counts);
                local.dirty = true;
            });
            return Err(err);
        }
        Ok(())
    }

    fn detach(&self) {
        self.core.detach();
    }
}

/// A thread-local accumulator for a named global bucketed histogram.
///
/// Dropping the stat unregisters it; bucket counts accumulated since the
/// last flush are discarded, so aggregate before dropping if it matters.
pub struct TlHistogram<P: LockPolicy = SingleThread> {
    inner: Arc<HistogramInner<P>>,
    bucket_width: u64,
    min: i64,
    max: i64,
}

impl<P: LockPolicy> TlHistogram<P> {
    /// Create a histogram over `[min, max)` with fixed-width buckets,
    /// establishing the same-shaped global histogram.
    pub fn new(
        stats: &ThreadLocalStats<P>,
        name: impl Into<String>,
        bucket_width: u64,
        min: i64,
        max: i64,
    ) -> Result<Self, StatsError> {
        let name = name.into();
        let buckets = BucketedHistogram::new(bucket_width, min, max)?;
        stats
            .store()
            .establish_histogram(&name, bucket_width, min, max)?;
        let inner = Arc::new(HistogramInner {
            core: StatCore::new(stats, name),
            local: P::new_cell(
                HistogramLocal {
                    buckets,
                    dirty: false,
                },
                stats.witness(),
            ),
        });
        let weak = Arc::downgrade(&inner);
        let entry: Weak<dyn AnyStat> = weak;
        inner.core.register(stats, entry);
        Ok(Self {
            inner,
            bucket_width,
            min,
            max,
        })
    }

    /// The histogram's name in the global store.
    pub fn name(&self) -> &str {
        self.inner.core.name()
    }

    /// Width of each value bucket.
    pub fn bucket_width(&self) -> u64 {
        self.bucket_width
    }

    /// Inclusive lower bound of the bucketed range.
    pub fn min(&self) -> i64 {
        self.min
    }

    /// Exclusive upper bound of the bucketed range.
    pub fn max(&self) -> i64 {
        self.max
    }

    /// Count one sample in the local histogram.
    #[inline]
    pub fn add_value(&self, value: i64) {
        P::with_cell(&self.inner.local, |local| {
            local.buckets.add_value(value);
            local.dirty = true;
        });
    }

    /// Count `nsamples` identical samples in the local histogram.
    #[inline]
    pub fn add_repeated_value(&self, value: i64, nsamples: u64) {
        P::with_cell(&self.inner.local, |local| {
            local.buckets.add_repeated_value(value, nsamples);
            local.dirty = true;
        });
    }

    /// Publish a percentile estimate from the global histogram.
    ///
    /// Fails with [`StatsError::Detached`] if the owning container has
    /// been destroyed and not reassigned.
    pub fn export_percentile(&self, percentile: u8) -> Result<(), StatsError> {
        let container = self.inner.core.container("exporting a percentile")?;
        container
            .store()
            .configure_percentile_exports(self.inner.core.name(), &[percentile])?;
        Ok(())
    }

    /// Stop publishing a percentile estimate.
    pub fn unexport_percentile(&self, percentile: u8) -> Result<(), StatsError> {
        let container = self.inner.core.container("unexporting a percentile")?;
        container
            .store()
            .retract_percentile_exports(self.inner.core.name(), &[percentile])?;
        Ok(())
    }

    /// Publish a derived statistic from the global histogram.
    pub fn export_stat(&self, kind: ExportType) -> Result<(), StatsError> {
        let container = self.inner.core.container("exporting a stat")?;
        container
            .store()
            .configure_histogram_exports(self.inner.core.name(), &[kind])?;
        Ok(())
    }

    /// Stop publishing a derived statistic.
    pub fn unexport_stat(&self, kind: ExportType) -> Result<(), StatsError> {
        let container = self.inner.core.container("unexporting a stat")?;
        container
            .store()
            .retract_histogram_exports(self.inner.core.name(), &[kind])?;
        Ok(())
    }
}

impl<P: LockPolicy> Drop for TlHistogram<P> {
    fn drop(&mut self) {
        self.inner.core.unregister();
    }
}
