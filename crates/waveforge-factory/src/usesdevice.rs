//! Best-effort allocation of `usesdevice` capacity dependencies
//!
//! All requests for one owner go to the allocation manager in a single
//! batch so independent capacities can be satisfied concurrently. Responses
//! are reconciled back onto the specs by request ID; any spec left without
//! an assigned device fails the set.

use crate::allocations::ScopedAllocations;
use crate::error::Result;
use crate::math::evaluate_math_in_request;
use std::collections::HashMap;
use tracing::{debug, trace, warn};
use waveforge_platform::{AllocationManager, AllocationRequest, DeviceAssignmentRecord};
use waveforge_types::{Property, UsesDeviceSpec};

/// Allocate every `usesdevice` in `specs` for `owner_identifier`.
///
/// On success the allocations are transferred into `allocations` and each
/// satisfied device is appended to `assignments`. On failure the partial
/// allocations are released and `Ok(false)` is returned; the unsatisfied
/// specs are the ones with no `assigned_device`.
pub async fn allocate_uses_devices(
    allocator: &dyn AllocationManager,
    owner_identifier: &str,
    specs: &mut [UsesDeviceSpec],
    configure_properties: &[Property],
    assignments: &mut Vec<DeviceAssignmentRecord>,
    allocations: &mut ScopedAllocations,
) -> Result<bool> {
    if specs.is_empty() {
        return Ok(true);
    }

    // No device may appear assigned from an earlier attempt; the caller
    // reports failures by checking for unassigned specs.
    for spec in specs.iter_mut() {
        spec.assigned_device = None;
    }

    let mut requests = Vec::with_capacity(specs.len());
    for spec in specs.iter() {
        let mut properties: Vec<Property> = spec
            .property_refs
            .iter()
            .map(|dep| dep.to_property())
            .collect();
        evaluate_math_in_request(&mut properties, configure_properties)?;
        requests.push(AllocationRequest {
            request_id: spec.id.clone(),
            properties,
            processor_deps: Vec::new(),
            os_deps: Vec::new(),
        });
    }

    let mut local = ScopedAllocations::new();
    let responses = allocator.allocate(requests).await?;

    let mut by_request: HashMap<String, usize> = HashMap::new();
    for (index, spec) in specs.iter().enumerate() {
        by_request.insert(spec.id.clone(), index);
    }

    for response in responses {
        trace!(allocation = %response.allocation_id, request = %response.request_id, "usesdevice allocated");
        local.push(response.allocation_id);

        let Some(&index) = by_request.get(response.request_id.as_str()) else {
            // The manager answered a request we never made; keep the
            // allocation tracked so it is released with the rest.
            warn!(request = %response.request_id, "allocation response does not match any usesdevice");
            continue;
        };
        specs[index].assigned_device = Some(response.device.identifier.clone());
        assignments.push(DeviceAssignmentRecord {
            component: owner_identifier.to_string(),
            device: response.device.identifier.clone(),
            node: response.device,
        });
    }

    if specs.iter().all(|spec| spec.assigned_device.is_some()) {
        local.transfer(allocations);
        Ok(true)
    } else {
        debug!(
            owner = owner_identifier,
            "some usesdevice dependencies were not satisfied"
        );
        local.release(allocator).await;
        Ok(false)
    }
}

/// Comma-separated list of the unsatisfied usesdevice IDs, for failure
/// messages
pub fn unsatisfied_ids(specs: &[UsesDeviceSpec]) -> String {
    specs
        .iter()
        .filter(|spec| spec.assigned_device.is_none())
        .map(|spec| spec.id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use waveforge_platform::{FakeExecutableDevice, FirstFitAllocationManager, ObjectTable};
    use waveforge_types::{PropertyRef, PropertyValue};

    fn uses(id: &str, prop: &str, value: &str) -> UsesDeviceSpec {
        UsesDeviceSpec::new(
            id,
            vec![PropertyRef::Simple {
                id: prop.into(),
                value: value.into(),
            }],
        )
    }

    #[tokio::test]
    async fn satisfied_set_transfers_allocations() {
        let objects = ObjectTable::new();
        let manager = FirstFitAllocationManager::new();
        let device = FakeExecutableDevice::new("gpp-0", objects);
        let node = FakeExecutableDevice::node(&device, vec![], vec![]);
        manager.register_device(
            node,
            vec![Property::new("bandwidth", PropertyValue::Long(100))],
        );

        let mut specs = vec![uses("u1", "bandwidth", "40"), uses("u2", "bandwidth", "40")];
        let mut assignments = Vec::new();
        let mut allocations = ScopedAllocations::new();

        let satisfied = allocate_uses_devices(
            &manager,
            "c1:wave_1",
            &mut specs,
            &[],
            &mut assignments,
            &mut allocations,
        )
        .await
        .unwrap();

        assert!(satisfied);
        assert_eq!(allocations.len(), 2);
        assert_eq!(assignments.len(), 2);
        assert!(specs.iter().all(|s| s.assigned_device.is_some()));
        assert_eq!(manager.outstanding(), 2);
        allocations.release(&manager).await;
    }

    #[tokio::test]
    async fn partial_failure_releases_and_reports() {
        let objects = ObjectTable::new();
        let manager = FirstFitAllocationManager::new();
        let device = FakeExecutableDevice::new("gpp-0", objects);
        let node = FakeExecutableDevice::node(&device, vec![], vec![]);
        manager.register_device(
            node,
            vec![Property::new("bandwidth", PropertyValue::Long(100))],
        );

        let mut specs = vec![uses("u1", "bandwidth", "80"), uses("u2", "bandwidth", "80")];
        let mut assignments = Vec::new();
        let mut allocations = ScopedAllocations::new();

        let satisfied = allocate_uses_devices(
            &manager,
            "c1:wave_1",
            &mut specs,
            &[],
            &mut assignments,
            &mut allocations,
        )
        .await
        .unwrap();

        assert!(!satisfied);
        assert!(allocations.is_empty());
        // The partial allocation was released with the local tracker
        assert_eq!(manager.outstanding(), 0);
        assert_eq!(unsatisfied_ids(&specs), "u2");
    }

    #[tokio::test]
    async fn math_is_applied_before_the_batch() {
        let objects = ObjectTable::new();
        let manager = FirstFitAllocationManager::new();
        let device = FakeExecutableDevice::new("gpp-0", objects);
        let node = FakeExecutableDevice::node(&device, vec![], vec![]);
        manager.register_device(
            node,
            vec![Property::new("sampleCapacity", PropertyValue::Long(3_000_000))],
        );

        let mut specs = vec![uses("u1", "sampleCapacity", "__MATH__(2,sampleRate,*)")];
        let configure = vec![Property::new("sampleRate", PropertyValue::Long(1_500_000))];
        let mut assignments = Vec::new();
        let mut allocations = ScopedAllocations::new();

        let satisfied = allocate_uses_devices(
            &manager,
            "c1:wave_1",
            &mut specs,
            &configure,
            &mut assignments,
            &mut allocations,
        )
        .await
        .unwrap();

        // 2 * 1_500_000 consumes the entire capacity, so satisfaction
        // proves the rewritten value reached the allocator.
        assert!(satisfied);
        assert_eq!(
            manager.remaining(&waveforge_types::DeviceId::new("gpp-0"), "sampleCapacity"),
            Some(0.0)
        );
        allocations.release(&manager).await;
    }
}
