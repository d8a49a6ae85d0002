//! Single-writer locking policy
//!
//! No locks are taken anywhere. The contract is that a container and every
//! stat registered with it are only touched from one thread at a time,
//! with hand-off to another thread explicitly sequenced through
//! [`swap_threads`](crate::container::ThreadLocalStats::swap_threads).
//! Debug builds enforce the contract with a [`ThreadWitness`]; release
//! builds compile the check away entirely, and violations are unchecked.

use std::cell::UnsafeCell;
use std::sync::Arc;

use super::LockPolicy;

/// Records which thread currently owns a container and its stats.
///
/// In debug builds every cell access checks the calling thread against the
/// recorded owner and panics on a mismatch without an intervening
/// [`forget`](ThreadWitness::forget). In release builds this is a zero-cost
/// empty struct.
#[derive(Default)]
pub struct ThreadWitness {
    #[cfg(debug_assertions)]
    owner: parking_lot::Mutex<Option<std::thread::ThreadId>>,
}

impl ThreadWitness {
    /// Assert that the calling thread owns this witness, claiming it if it
    /// is currently unowned. Debug builds only; a no-op in release builds.
    #[inline]
    pub fn check(&self) {
        #[cfg(debug_assertions)]
        {
            // Never turn an in-progress unwind into an abort: stat
            // destructors touch their cells while panicking.
            if std::thread::panicking() {
                return;
            }
            let current = std::thread::current().id();
            let mut owner = self.owner.lock();
            match *owner {
                None => *owner = Some(current),
                Some(prev) => {
                    if prev != current {
                        panic!(
                            "single-writer stats accessed from {current:?} but owned by \
                             {prev:?}; call swap_threads() before handing a container to \
                             another thread"
                        );
                    }
                }
            }
        }
    }

    /// Clear the recorded owner so the next access may come from any
    /// thread. The caller is responsible for the external synchronization
    /// of the actual hand-off.
    #[inline]
    pub fn forget(&self) {
        #[cfg(debug_assertions)]
        {
            *self.owner.lock() = None;
        }
    }
}

/// Unguarded cell used by the [`SingleThread`] policy.
///
/// Access goes straight through an `UnsafeCell`; exclusivity comes from the
/// single-writer protocol, witnessed in debug builds.
pub struct SingleCell<T> {
    value: UnsafeCell<T>,
    witness: Arc<ThreadWitness>,
}

// Safety: the single-writer protocol guarantees that at most one thread
// touches the cell at a time, with cross-thread hand-off explicitly
// sequenced by the caller. The witness enforces this in debug builds;
// release builds trust the protocol, as documented on the policy.
unsafe impl<T: Send> Send for SingleCell<T> {}
unsafe impl<T: Send> Sync for SingleCell<T> {}

/// Locking policy for containers used from a single thread at a time.
///
/// All guards compile to no-ops. Updates and aggregation must originate
/// from the owning thread; ownership may be handed to another thread by
/// calling the container's `swap_threads` between the last access on the
/// old thread and the first access on the new one.
pub enum SingleThread {}

impl LockPolicy for SingleThread {
    type Witness = Arc<ThreadWitness>;
    type Cell<T: Send> = SingleCell<T>;

    fn new_cell<T: Send>(value: T, witness: &Self::Witness) -> Self::Cell<T> {
        SingleCell {
            value: UnsafeCell::new(value),
            witness: Arc::clone(witness),
        }
    }

    #[inline]
    fn with_cell<T: Send, R>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> R) -> R {
        cell.witness.check();
        // Safety: exclusive access per the single-writer protocol (see the
        // Send/Sync impls above); callers never re-enter the same cell.
        let value = unsafe { &mut *cell.value.get() };
        f(value)
    }

    #[inline]
    fn swap_threads(witness: &Self::Witness) {
        witness.forget();
    }
}
