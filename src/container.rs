//! Thread-local stats container
//!
//! A [`ThreadLocalStats`] owns the registry of live stats created against
//! it and drives the periodic flush sweep that pushes their accumulated
//! data into the global store. The registry holds weak handles only —
//! stats manage their own lifetime and register/unregister themselves as
//! part of construction and destruction.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::locking::{LockPolicy, SingleThread};
use crate::stat::AnyStat;
use crate::store::GlobalStore;

/// Registry of currently-registered stats, keyed by slot id.
#[derive(Default)]
struct Registry {
    stats: HashMap<u64, Weak<dyn AnyStat>>,
    next_slot: u64,
}

/// Shared container state referenced weakly by every registered stat.
pub(crate) struct ContainerShared<P: LockPolicy> {
    store: Arc<dyn GlobalStore>,
    witness: P::Witness,
    registry: P::Cell<Registry>,
}

impl<P: LockPolicy> ContainerShared<P> {
    pub(crate) fn store(&self) -> &Arc<dyn GlobalStore> {
        &self.store
    }

    pub(crate) fn witness(&self) -> &P::Witness {
        &self.witness
    }

    /// Insert a stat into the registry, returning its slot id.
    pub(crate) fn register_slot(&self, entry: Weak<dyn AnyStat>) -> u64 {
        P::with_cell(&self.registry, |registry| {
            let slot = registry.next_slot;
            registry.next_slot += 1;
            registry.stats.insert(slot, entry);
            slot
        })
    }

    /// Remove a stat from the registry.
    pub(crate) fn unregister_slot(&self, slot: u64) {
        P::with_cell(&self.registry, |registry| {
            registry.stats.remove(&slot);
        });
    }
}

/// A per-thread (or per-logical-owner) group of thread-local statistics.
///
/// Stats created against a container cache their updates locally;
/// [`aggregate`](ThreadLocalStats::aggregate) must be called periodically
/// (ideally once a second) to publish them into the global store.
///
/// Under the default [`SingleThread`] policy all operations on the
/// container and its stats must come from one thread at a time, including
/// aggregation; use [`ThreadSafe`](crate::ThreadSafe) to allow any-thread
/// access at the cost of per-access locking.
pub struct ThreadLocalStats<P: LockPolicy = SingleThread> {
    shared: Arc<ContainerShared<P>>,
}

impl<P: LockPolicy> ThreadLocalStats<P> {
    /// Create a new container aggregating into the given global store.
    pub fn new(store: Arc<dyn GlobalStore>) -> Self {
        let witness = P::Witness::default();
        let registry = P::new_cell(Registry::default(), &witness);
        Self {
            shared: Arc::new(ContainerShared {
                store,
                witness,
                registry,
            }),
        }
    }

    /// The global store this container aggregates into.
    pub fn store(&self) -> &Arc<dyn GlobalStore> {
        &self.shared.store
    }

    /// Flush every registered stat into the global store at the current
    /// wall-clock time.
    pub fn aggregate(&self) {
        self.aggregate_at(unix_time_now());
    }

    /// Flush every registered stat into the global store, recording
    /// samples at the given timestamp (seconds since the Unix epoch).
    ///
    /// The sweep snapshots the registry, then visits each stat outside the
    /// registry guard. Stats registered after the snapshot are not flushed
    /// in this sweep; a stat unregistered after the snapshot is flushed at
    /// most once more, and the sweep's strong reference keeps its shared
    /// state alive for the duration of that flush. A flush failure in one
    /// stat is logged and never prevents the sweep from continuing.
    pub fn aggregate_at(&self, now: u64) {
        let snapshot: Vec<Weak<dyn AnyStat>> = P::with_cell(&self.shared.registry, |registry| {
            registry.stats.values().cloned().collect()
        });

        for entry in snapshot {
            let Some(stat) = entry.upgrade() else {
                // Destroyed between the snapshot and the visit.
                continue;
            };
            if let Err(err) = stat.flush(self.shared.store.as_ref(), now) {
                warn!(stat = stat.name(), error = %err, "failed to flush stat during sweep");
            }
        }
    }

    /// Inform the container that it is about to be handed to another
    /// thread.
    ///
    /// Only meaningful under the [`SingleThread`] policy, where it clears
    /// the debug-build thread-ownership record for the container and all
    /// of its stats. The caller remains responsible for externally
    /// synchronizing the actual hand-off.
    pub fn swap_threads(&self) {
        P::swap_threads(&self.shared.witness);
    }

    pub(crate) fn shared(&self) -> &Arc<ContainerShared<P>> {
        &self.shared
    }

    pub(crate) fn witness(&self) -> &P::Witness {
        &self.shared.witness
    }
}

impl<P: LockPolicy> Drop for ThreadLocalStats<P> {
    fn drop(&mut self) {
        // Detach every still-registered stat's back-reference before the
        // container state is released, so a stat destroyed later never
        // resolves a dangling container.
        let entries: Vec<Weak<dyn AnyStat>> = P::with_cell(&self.shared.registry, |registry| {
            registry.stats.drain().map(|(_, entry)| entry).collect()
        });
        for entry in entries {
            if let Some(stat) = entry.upgrade() {
                debug!(stat = stat.name(), "detaching stat from container being destroyed");
                stat.detach();
            }
        }
    }
}

fn unix_time_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
