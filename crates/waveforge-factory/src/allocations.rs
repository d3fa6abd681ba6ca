//! Scoped allocation tracking
//!
//! Every allocation made during a deployment attempt lands in a scoped
//! tracker. Nested scopes (per-implementation attempt, per-collocation
//! attempt, whole deployment) compose by transferring upward on success;
//! a scope that is abandoned must be released explicitly before it goes
//! away — Rust has no async destructors, so the deploy transaction follows
//! an explicit try-commit-or-rollback discipline and `Drop` only flags
//! trackers that were forgotten.

use tracing::{trace, warn};
use waveforge_platform::AllocationManager;
use waveforge_types::AllocationId;

/// A scope's worth of allocation IDs
#[derive(Debug, Default)]
pub struct ScopedAllocations {
    ids: Vec<AllocationId>,
}

impl ScopedAllocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: AllocationId) {
        self.ids.push(id);
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Move every held ID into another tracker, emptying this one
    pub fn transfer(&mut self, dest: &mut ScopedAllocations) {
        dest.ids.append(&mut self.ids);
    }

    /// Take the held IDs as a plain list, emptying this one
    pub fn take(&mut self) -> Vec<AllocationId> {
        std::mem::take(&mut self.ids)
    }

    /// Release every held ID through the allocation manager. Release is
    /// best-effort: it runs during cleanup, so failures are logged and
    /// swallowed.
    pub async fn release(&mut self, allocator: &dyn AllocationManager) {
        if self.ids.is_empty() {
            return;
        }
        trace!(count = self.ids.len(), "releasing allocations");
        let ids = std::mem::take(&mut self.ids);
        if let Err(err) = allocator.deallocate(&ids).await {
            warn!(error = %err, "failed to release allocations during cleanup");
        }
    }
}

impl Drop for ScopedAllocations {
    fn drop(&mut self) {
        if !self.ids.is_empty() {
            warn!(
                count = self.ids.len(),
                "allocation tracker dropped while still holding allocations"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use waveforge_platform::{FakeExecutableDevice, FirstFitAllocationManager, ObjectTable};
    use waveforge_types::{Property, PropertyValue};

    async fn manager_with_allocation() -> (FirstFitAllocationManager, AllocationId) {
        let objects = ObjectTable::new();
        let manager = FirstFitAllocationManager::new();
        let device = FakeExecutableDevice::new("gpp-0", objects);
        let node = FakeExecutableDevice::node(&device, vec![], vec![]);
        manager.register_device(
            node.clone(),
            vec![Property::new("slots", PropertyValue::Long(4))],
        );
        let granted = manager
            .allocate_deployment(
                "req",
                vec![Property::new("slots", PropertyValue::Long(1))],
                &[node],
                &[],
                &[],
            )
            .await
            .unwrap()
            .unwrap();
        (manager, granted.allocation_id)
    }

    #[tokio::test]
    async fn release_drains_the_tracker() {
        let (manager, id) = manager_with_allocation().await;
        let mut scope = ScopedAllocations::new();
        scope.push(id);
        assert_eq!(manager.outstanding(), 1);

        scope.release(&manager).await;
        assert!(scope.is_empty());
        assert_eq!(manager.outstanding(), 0);

        // A second release is a no-op
        scope.release(&manager).await;
        assert_eq!(manager.outstanding(), 0);
    }

    #[tokio::test]
    async fn transfer_moves_ownership_without_releasing() {
        let (manager, id) = manager_with_allocation().await;
        let mut inner = ScopedAllocations::new();
        inner.push(id);

        let mut outer = ScopedAllocations::new();
        inner.transfer(&mut outer);
        assert!(inner.is_empty());
        assert_eq!(outer.len(), 1);
        assert_eq!(manager.outstanding(), 1);

        let ids = outer.take();
        assert_eq!(ids.len(), 1);
        assert!(outer.is_empty());
        let _ = Arc::new(manager); // allocation now owned by the application
    }
}
