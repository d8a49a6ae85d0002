//! tlstats - Thread-local statistics accumulation
//!
//! This crate batches counter, histogram, and time-series updates in
//! thread-local accumulators and periodically flushes them into a shared,
//! globally-queryable statistics store:
//!
//! - **No per-update locking**: with the [`SingleThread`] policy a stat
//!   update is a plain arithmetic operation on local state. The
//!   [`ThreadSafe`] policy adds fine-grained per-stat locks and in exchange
//!   allows updates and aggregation from any thread.
//! - **No per-update string lookups**: each stat is established in the
//!   global store once, at construction. The hot path never touches the
//!   store's name map; the name is only used when a flush sweep pushes the
//!   accumulated data out.
//!
//! # Usage
//!
//! Construct one [`ThreadLocalStats`] container per thread (or per logical
//! owner), create one persistent stat object per metric against it, and
//! call the cheap local-update operations from the hot path. A periodic
//! driver calls [`ThreadLocalStats::aggregate`], which flushes every
//! registered stat into the global store and resets the local accumulators.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tlstats::{MemoryStore, ThreadLocalStats, TlCounter, TlTimeseries};
//!
//! let store = Arc::new(MemoryStore::new());
//! let stats: ThreadLocalStats = ThreadLocalStats::new(store.clone());
//!
//! let requests = TlCounter::new(&stats, "requests")?;
//! let latency = TlTimeseries::new(&stats, "latency_ms")?;
//!
//! // Hot path: purely local updates.
//! requests.increment_value(1);
//! latency.add_value(12);
//!
//! // Periodically (ideally once a second):
//! stats.aggregate();
//! ```
//!
//! # Thread Safety
//!
//! The locking behavior is selected at compile time through the
//! [`LockPolicy`] parameter. [`SingleThread`] performs no locking at all;
//! in debug builds it asserts that a container and its stats are only
//! touched from one thread at a time, with explicit hand-off via
//! [`ThreadLocalStats::swap_threads`]. [`ThreadSafe`] serializes every
//! stat access on a per-stat lock and every registry mutation on the
//! container's registry lock, so any thread may update stats or drive
//! aggregation.

#![warn(missing_docs)]

pub mod container;
pub mod counter;
pub mod error;
pub mod histogram;
pub mod locking;
pub mod store;
pub mod timeseries;

mod stat;

pub use container::ThreadLocalStats;
pub use counter::TlCounter;
pub use error::StatsError;
pub use histogram::{BucketedHistogram, TlHistogram};
pub use locking::{LockPolicy, SingleThread, ThreadSafe};
pub use store::{ExportType, GlobalStore, MemoryStore, StoreError, TimeSeriesSample};
pub use timeseries::TlTimeseries;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::container::ThreadLocalStats;
    pub use crate::counter::TlCounter;
    pub use crate::error::StatsError;
    pub use crate::histogram::TlHistogram;
    pub use crate::locking::{LockPolicy, SingleThread, ThreadSafe};
    pub use crate::store::{ExportType, GlobalStore};
    pub use crate::timeseries::TlTimeseries;
}
