//! Allocation manager contract
//!
//! Capacity reservations are opaque to the factory: it builds requests,
//! records the returned allocation IDs, and releases them on rollback or
//! hands them to the application on success. Matching semantics live behind
//! this trait.

use crate::device::DeviceNode;
use crate::error::Result;
use async_trait::async_trait;
use waveforge_types::{AllocationId, OsDep, Property};

/// One entry of a batched allocation request
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    /// Caller-chosen ID used to reconcile responses
    pub request_id: String,

    /// Typed capacity properties
    pub properties: Vec<Property>,

    /// Processor constraint; empty means unconstrained
    pub processor_deps: Vec<String>,

    /// Operating system constraint; empty means unconstrained
    pub os_deps: Vec<OsDep>,
}

/// A satisfied entry of a batched request
#[derive(Debug, Clone)]
pub struct AllocationResponse {
    pub request_id: String,
    pub allocation_id: AllocationId,
    pub device: DeviceNode,
}

/// Result of a deployment allocation against a candidate list
#[derive(Debug, Clone)]
pub struct DeploymentAllocation {
    pub allocation_id: AllocationId,
    pub device: DeviceNode,
}

/// The allocation manager consumed by the factory
///
/// Implementations must be safe for concurrent allocate/deallocate; two
/// deployments contend only here and through the naming service.
#[async_trait]
pub trait AllocationManager: Send + Sync {
    /// Best-effort batched allocation: the response sequence contains an
    /// entry per *satisfied* request, in no particular order. Unsatisfied
    /// requests are simply absent.
    async fn allocate(&self, requests: Vec<AllocationRequest>) -> Result<Vec<AllocationResponse>>;

    /// Allocate deployment capacity for one component implementation
    /// against an ordered candidate device list. `Ok(None)` means no
    /// candidate could satisfy the request.
    async fn allocate_deployment(
        &self,
        request_id: &str,
        properties: Vec<Property>,
        candidates: &[DeviceNode],
        processor_deps: &[String],
        os_deps: &[OsDep],
    ) -> Result<Option<DeploymentAllocation>>;

    /// Release previously granted allocations. Unknown IDs are ignored.
    async fn deallocate(&self, ids: &[AllocationId]) -> Result<()>;
}
