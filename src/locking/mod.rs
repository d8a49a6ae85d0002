//! Locking policies for thread-local stat containers
//!
//! A [`LockPolicy`] decides, at compile time, whether stat and registry
//! access is synchronized. [`SingleThread`] performs no locking and is the
//! fastest option, at the cost of restricting a container and its stats to
//! one thread at a time. [`ThreadSafe`] guards every piece of local state
//! with a fine-grained lock so any thread may update or aggregate.
//!
//! Both policies express their guarded state through the same cell
//! abstraction: the container's registry, each stat's accumulators, and
//! each stat's container back-reference all live in policy cells, so the
//! rest of the crate is policy-agnostic.

pub mod single_thread;
pub mod thread_safe;

pub use single_thread::{SingleThread, ThreadWitness};
pub use thread_safe::ThreadSafe;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::SingleThread {}
    impl Sealed for super::ThreadSafe {}
}

/// Compile-time-selected locking strategy for a stats container.
///
/// This trait is sealed; [`SingleThread`] and [`ThreadSafe`] are the only
/// implementations. It is an internal seam shared by the container and the
/// stat types — the cell accessors are public so generic code can name
/// them, but they are not a general-purpose synchronization API: a cell
/// access closure must never re-enter the cell it was called on.
pub trait LockPolicy: sealed::Sealed + Sized + 'static {
    /// Thread-affinity bookkeeping shared by a container and its stats.
    ///
    /// One witness is created per container and cloned into every cell
    /// built against that container, so a single transfer marker call
    /// covers the container and all of its stats.
    type Witness: Clone + Default + Send + Sync;

    /// Guarded storage for one piece of local state.
    type Cell<T: Send>: Send + Sync;

    /// Create a cell owned by the container whose witness is given.
    fn new_cell<T: Send>(value: T, witness: &Self::Witness) -> Self::Cell<T>;

    /// Run `f` with exclusive access to the cell's contents.
    ///
    /// `f` runs under the per-stat guard (a no-op for [`SingleThread`], a
    /// real lock for [`ThreadSafe`]) and must not block or re-enter the
    /// same cell.
    fn with_cell<T: Send, R>(cell: &Self::Cell<T>, f: impl FnOnce(&mut T) -> R) -> R;

    /// Thread-transfer marker.
    ///
    /// Tells the [`SingleThread`] policy that the next access is
    /// intentionally from a different thread, clearing the recorded owner.
    /// A no-op for [`ThreadSafe`], which has no affinity restriction.
    fn swap_threads(witness: &Self::Witness);
}
