//! Errors reported by thread-local stat operations.

use crate::store::StoreError;

/// Errors returned by stat construction and configuration operations.
///
/// Thread-affinity violations under the single-writer policy are not
/// represented here: they are programming errors surfaced as debug-build
/// panics, since no safe recovery exists once local state may have been
/// touched from the wrong thread.
#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    /// The stat's owning container has been destroyed (or was never set),
    /// so an operation that needs it cannot proceed.
    #[error("stat '{name}' is not attached to a container while {op}")]
    Detached {
        /// Name of the stat.
        name: String,
        /// The operation that required a live container.
        op: &'static str,
    },

    /// Rejected histogram shape: the bucket width must be non-zero and the
    /// range non-empty.
    #[error("invalid histogram shape (bucket_width={bucket_width}, min={min}, max={max})")]
    InvalidHistogram {
        /// Requested bucket width.
        bucket_width: u64,
        /// Requested inclusive lower bound.
        min: i64,
        /// Requested exclusive upper bound.
        max: i64,
    },

    /// Error reported by the global store.
    #[error(transparent)]
    Store(#[from] StoreError),
}
