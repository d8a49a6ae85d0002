//! Multi-writer locking policy
//!
//! Every cell is guarded by its own `parking_lot::Mutex`, so updates,
//! aggregation, and registration may come from any thread. This trades a
//! small per-access cost for the freedom to drive `aggregate()` from a
//! dedicated thread instead of the threads doing the updates.

use parking_lot::Mutex;

use super::LockPolicy;

/// Locking policy for containers shared across threads.
///
/// Per-stat state is serialized on a fine-grained per-cell lock and the
/// container's registry on its own lock; there is no thread-affinity
/// restriction, and the transfer marker is a no-op.
pub enum ThreadSafe {}

impl LockPolicy for ThreadSafe {
    type Witness = ();
    type Cell<T: Send> = Mutex<T>;

    fn new_cell<T: Send>(value: T, _witness: &Self::Witness) -> Self::Cell<T> {
        Mutex::new(value)
    }

    #[inline]
    fn with_cell<T: Send, R>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = cell.lock();
        f(&mut guard)
    }

    #[inline]
    fn swap_threads(_witness: &Self::Witness) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_cell_basic_access() {
        let cell = ThreadSafe::new_cell(0i64, &());

        ThreadSafe::with_cell(&cell, |v| *v += 41);
        ThreadSafe::with_cell(&cell, |v| *v += 1);

        assert_eq!(ThreadSafe::with_cell(&cell, |v| *v), 42);
    }

    #[test]
    fn test_cell_concurrent_increments() {
        let cell = Arc::new(ThreadSafe::new_cell(0u64, &()));
        let threads = 4;
        let per_thread = 10_000;

        std::thread::scope(|s| {
            for _ in 0..threads {
                let cell = Arc::clone(&cell);
                s.spawn(move || {
                    for _ in 0..per_thread {
                        ThreadSafe::with_cell(&cell, |v| *v += 1);
                    }
                });
            }
        });

        assert_eq!(
            ThreadSafe::with_cell(&cell, |v| *v),
            threads * per_thread
        );
    }
}
