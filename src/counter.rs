//! Thread-local counter stat
//!
//! A counter tracks a single global value. The thread-local object only
//! accumulates a signed delta; each flush adds the delta to the global
//! counter and resets the local value to zero, so increments made through
//! any number of thread-local counters with the same name sum correctly.
//!
//! There is intentionally no set-absolute-value operation: absolute writes
//! from multiple threads would merge in an undefined order. Callers that
//! need one must write the global store directly.

use std::sync::{Arc, Weak};

use crate::container::ThreadLocalStats;
use crate::error::StatsError;
use crate::locking::{LockPolicy, SingleThread};
use crate::stat::{AnyStat, StatCore};
use crate::store::{GlobalStore, StoreError};

struct CounterInner<P: LockPolicy> {
    core: StatCore<P>,
    value: P::Cell<i64>,
}

impl<P: LockPolicy> AnyStat for CounterInner<P> {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn flush(&self, store: &dyn GlobalStore, _now: u64) -> Result<(), StoreError> {
        let delta = P::with_cell(&self.value, std::mem::take);
        if delta == 0 {
            return Ok(());
        }
        if let Err(err) = store.add_to_counter(self.core.name(), delta) {
            // Put the delta back so the data survives to the next sweep.
            P::with_cell(&self.value, |value| *value += delta);
            return Err(err);
        }
        Ok(())
    }

    fn detach(&self) {
        self.core.detach();
    }
}

/// A thread-local accumulator for a named global counter.
///
/// Dropping the counter unregisters it; any delta accumulated since the
/// last flush is discarded, so aggregate before dropping if it matters.
pub struct TlCounter<P: LockPolicy = SingleThread> {
    inner: Arc<CounterInner<P>>,
}

impl<P: LockPolicy> std::fmt::Debug for TlCounter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlCounter")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

impl<P: LockPolicy> TlCounter<P> {
    /// Create a counter, establishing the global counter of the same name.
    pub fn new(
        stats: &ThreadLocalStats<P>,
        name: impl Into<String>,
    ) -> Result<Self, StatsError> {
        let name = name.into();
        stats.store().establish_counter(&name)?;
        let inner = Arc::new(CounterInner {
            core: StatCore::new(stats, name),
            value: P::new_cell(0, stats.witness()),
        });
        let weak = Arc::downgrade(&inner);
        let entry: Weak<dyn AnyStat> = weak;
        inner.core.register(stats, entry);
        Ok(Self { inner })
    }

    /// The counter's name in the global store.
    pub fn name(&self) -> &str {
        self.inner.core.name()
    }

    /// Add `amount` to the local delta. Negative amounts decrement.
    #[inline]
    pub fn increment_value(&self, amount: i64) {
        P::with_cell(&self.inner.value, |value| *value += amount);
    }

    /// The local delta accumulated since the last flush.
    pub fn value(&self) -> i64 {
        P::with_cell(&self.inner.value, |value| *value)
    }
}

impl<P: LockPolicy> Drop for TlCounter<P> {
    fn drop(&mut self) {
        self.inner.core.unregister();
    }
}
