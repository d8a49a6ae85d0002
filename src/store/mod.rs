//! Global statistics store boundary
//!
//! The thread-local layer does not hold long-lived metrics itself; it
//! flushes into a [`GlobalStore`], which owns the named counters, rolling
//! time series, and bucketed histograms that answer queries. The store is
//! responsible for its own internal synchronization — every call into it
//! is assumed thread-safe.
//!
//! Names must be established before they can be updated: establishment at
//! stat-construction time is the thread-local layer's responsibility, and
//! name-based calls against a never-established name fail with
//! [`StoreError::NotFound`].

pub mod memory;

pub use memory::{MemoryStore, TimeSeriesSample};

use std::fmt;

/// Derived statistics a store can publish for a time series or histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExportType {
    /// Sum of recorded values per rolling window.
    Sum,
    /// Number of recorded samples per rolling window.
    Count,
    /// Average value per rolling window.
    Avg,
    /// Rate of samples per second.
    Rate,
    /// Percentage view (sum over count, scaled to percent).
    Percent,
}

impl ExportType {
    /// Get the export type as a string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ExportType::Sum => "sum",
            ExportType::Count => "count",
            ExportType::Avg => "avg",
            ExportType::Rate => "rate",
            ExportType::Percent => "pct",
        }
    }
}

impl fmt::Display for ExportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors reported by a global store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The named stat was never established in the store.
    #[error("no stat named '{0}' has been established")]
    NotFound(String),

    /// The name is already established as a different kind of stat.
    #[error("stat '{name}' is already established as a different kind")]
    KindMismatch {
        /// Name of the conflicting stat.
        name: String,
    },

    /// The named histogram exists with a different bucket shape.
    #[error("histogram '{name}' is already established with a different shape")]
    ShapeMismatch {
        /// Name of the conflicting histogram.
        name: String,
    },
}

/// The shared store that long-lived, queryable metrics aggregate into.
///
/// Timestamps are seconds since the Unix epoch, supplied by the flush
/// sweep so that every stat flushed in one sweep shares one timestamp.
pub trait GlobalStore: Send + Sync {
    /// Establish a named persistent counter, initially zero.
    ///
    /// Establishing an existing counter is a no-op; establishing a name
    /// held by a different stat kind fails with
    /// [`StoreError::KindMismatch`].
    fn establish_counter(&self, name: &str) -> Result<(), StoreError>;

    /// Establish a named rolling time series.
    fn establish_time_series(&self, name: &str) -> Result<(), StoreError>;

    /// Establish a named bucketed histogram over `[min, max)` with
    /// fixed-width buckets.
    ///
    /// Re-establishing with the same shape is a no-op; a different shape
    /// fails with [`StoreError::ShapeMismatch`].
    fn establish_histogram(
        &self,
        name: &str,
        bucket_width: u64,
        min: i64,
        max: i64,
    ) -> Result<(), StoreError>;

    /// Add a signed delta to a named persistent counter.
    fn add_to_counter(&self, name: &str, delta: i64) -> Result<(), StoreError>;

    /// Record one aggregated `(sum, count)` sample into a named rolling
    /// series at the given timestamp.
    fn record_time_series_sample(
        &self,
        name: &str,
        sum: i64,
        count: u64,
        timestamp: u64,
    ) -> Result<(), StoreError>;

    /// Publish additional derived statistics for a named time series.
    fn configure_exports(&self, name: &str, kinds: &[ExportType]) -> Result<(), StoreError>;

    /// Stop publishing derived statistics for a named time series.
    fn retract_exports(&self, name: &str, kinds: &[ExportType]) -> Result<(), StoreError>;

    /// Merge per-bucket count deltas into a same-shaped named histogram.
    ///
    /// `bucket_deltas` covers the full bucket layout, including the
    /// under-range and over-range buckets; a length mismatch fails with
    /// [`StoreError::ShapeMismatch`].
    fn merge_histogram_buckets(
        &self,
        name: &str,
        bucket_deltas: &[u64],
        timestamp: u64,
    ) -> Result<(), StoreError>;

    /// Publish percentile estimates for a named histogram.
    fn configure_percentile_exports(
        &self,
        name: &str,
        percentiles: &[u8],
    ) -> Result<(), StoreError>;

    /// Stop publishing percentile estimates for a named histogram.
    fn retract_percentile_exports(
        &self,
        name: &str,
        percentiles: &[u8],
    ) -> Result<(), StoreError>;

    /// Publish derived statistics for a named histogram.
    fn configure_histogram_exports(
        &self,
        name: &str,
        kinds: &[ExportType],
    ) -> Result<(), StoreError>;

    /// Stop publishing derived statistics for a named histogram.
    fn retract_histogram_exports(
        &self,
        name: &str,
        kinds: &[ExportType],
    ) -> Result<(), StoreError>;
}
