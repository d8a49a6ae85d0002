//! Shared stat lifecycle machinery
//!
//! Every concrete stat kind embeds a [`StatCore`], which owns the stat's
//! name and its attachment to the owning container. The lifecycle protocol
//! is strict:
//!
//! - registration is the terminal step of construction, so a stat is never
//!   visible to a flush sweep before it is fully built;
//! - unregistration is the first step of destruction, so no sweep starts
//!   flushing a stat whose state is being torn down.
//!
//! The container is referenced through a weak handle resolved per
//! operation, never a raw back-pointer: if the container is destroyed
//! first it detaches every registered stat, and later operations that need
//! it report [`StatsError::Detached`] instead of touching freed state.

use std::sync::{Arc, Weak};

use tracing::trace;

use crate::container::{ContainerShared, ThreadLocalStats};
use crate::error::StatsError;
use crate::locking::LockPolicy;
use crate::store::{GlobalStore, StoreError};

/// Registry-facing view of a stat: what a flush sweep needs.
pub(crate) trait AnyStat: Send + Sync {
    /// The stat's name in the global store.
    fn name(&self) -> &str;

    /// Push accumulated local data into the store and reset the local
    /// accumulators. `now` is the sweep timestamp in Unix seconds.
    fn flush(&self, store: &dyn GlobalStore, now: u64) -> Result<(), StoreError>;

    /// Drop the back-reference to the container. Called by the container's
    /// destructor on every still-registered stat.
    fn detach(&self);
}

/// A live link from a stat to its container: the weak container handle and
/// the stat's registry slot.
struct Attachment<P: LockPolicy> {
    container: Weak<ContainerShared<P>>,
    slot: u64,
}

/// Name and container attachment shared by every stat kind.
pub(crate) struct StatCore<P: LockPolicy> {
    name: String,
    attachment: P::Cell<Option<Attachment<P>>>,
}

impl<P: LockPolicy> StatCore<P> {
    /// Build an unattached core. The caller must finish constructing the
    /// concrete stat and then call [`register`](Self::register).
    pub(crate) fn new(stats: &ThreadLocalStats<P>, name: String) -> Self {
        Self {
            name,
            attachment: P::new_cell(None, stats.witness()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Terminal construction step: insert the stat into the container's
    /// registry, making it visible to flush sweeps.
    pub(crate) fn register(&self, stats: &ThreadLocalStats<P>, entry: Weak<dyn AnyStat>) {
        let shared = stats.shared();
        let slot = shared.register_slot(entry);
        let attachment = Attachment {
            container: Arc::downgrade(shared),
            slot,
        };
        P::with_cell(&self.attachment, |current| {
            debug_assert!(current.is_none(), "stat registered twice");
            *current = Some(attachment);
        });
        trace!(stat = %self.name, slot, "registered stat");
    }

    /// First destruction step: remove the stat from the registry so no
    /// future sweep will touch it.
    pub(crate) fn unregister(&self) {
        let taken = P::with_cell(&self.attachment, |current| current.take());
        if let Some(attachment) = taken {
            if let Some(container) = attachment.container.upgrade() {
                container.unregister_slot(attachment.slot);
                trace!(stat = %self.name, slot = attachment.slot, "unregistered stat");
            }
        }
    }

    /// Container-side detach, used when the container is destroyed before
    /// the stat. The registry entry is already gone at that point.
    pub(crate) fn detach(&self) {
        P::with_cell(&self.attachment, |current| {
            current.take();
        });
    }

    /// Resolve the owning container, or report a usage error naming the
    /// operation that needed it.
    pub(crate) fn container(
        &self,
        op: &'static str,
    ) -> Result<Arc<ContainerShared<P>>, StatsError> {
        P::with_cell(&self.attachment, |current| {
            current
                .as_ref()
                .and_then(|attachment| attachment.container.upgrade())
        })
        .ok_or_else(|| StatsError::Detached {
            name: self.name.clone(),
            op,
        })
    }
}
