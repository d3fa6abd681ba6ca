//! Single-component placement
//!
//! For one component, placement walks the declared implementations in
//! order, satisfies usesdevice dependencies at each level, and asks the
//! allocation manager for deployment capacity against the candidate device
//! list. The first implementation that clears every hurdle wins.

use crate::allocations::ScopedAllocations;
use crate::error::{CreateError, DeviceAssignment, Result};
use crate::math::evaluate_math_in_request;
use crate::softpkg::resolve_softpkg_dependencies;
use crate::usesdevice::{allocate_uses_devices, unsatisfied_ids};
use tracing::{debug, info, trace};
use uuid::Uuid;
use waveforge_platform::{
    AllocationManager, DeviceAssignmentRecord, DeviceNode, RemoteDevice, UsageState,
};
use waveforge_types::{ComponentSpec, DeviceId, Property};

/// The slice of deployment state placement operates on, borrowed from the
/// deploy transaction
pub(crate) struct PlacementContext<'a> {
    pub allocator: &'a dyn AllocationManager,
    /// Full registry snapshot, used for failure diagnosis
    pub registered_devices: &'a [DeviceNode],
    /// Executable devices in affinity order; successful placements rotate
    /// their device to the front
    pub executable_devices: &'a mut Vec<DeviceNode>,
    /// Deployment-scoped allocation tracker
    pub allocations: &'a mut ScopedAllocations,
    /// Per-component device assignments accumulated for the application
    pub assignments: &'a mut Vec<DeviceAssignmentRecord>,
}

/// Move the named device to the front of the list, preserving the order of
/// the rest. Packing bias: subsequent placements try it first.
pub(crate) fn rotate_device_list(devices: &mut [DeviceNode], identifier: &DeviceId) {
    if let Some(position) = devices.iter().position(|d| &d.identifier == identifier) {
        devices.rotate_left(position);
    }
}

/// Assign `component` to a device, honoring a pinned device from the
/// caller's assignment map when given.
pub(crate) async fn allocate_component(
    ctx: &mut PlacementContext<'_>,
    component: &mut ComponentSpec,
    preferred_device: Option<&DeviceId>,
) -> Result<()> {
    let mut candidates: Vec<DeviceNode> = ctx.executable_devices.clone();
    if let Some(preferred) = preferred_device {
        trace!(component = %component.instance_id, device = %preferred, "user assignment pins candidate device");
        match candidates.iter().position(|d| &d.identifier == preferred) {
            Some(position) => {
                let device = candidates.swap_remove(position);
                candidates = vec![device];
            }
            None => {
                debug!(component = %component.instance_id, device = %preferred, "assignment names an unknown device");
                return Err(CreateError::BadAssignment {
                    assignments: vec![DeviceAssignment {
                        component: component.instance_id.clone(),
                        device: preferred.clone(),
                    }],
                });
            }
        }
    }

    let configure_properties = component.configure_properties.clone();

    // Component-level usesdevices commit straight to the deployment scope
    let satisfied = allocate_uses_devices(
        ctx.allocator,
        &component.identifier,
        &mut component.uses_devices,
        &configure_properties,
        ctx.assignments,
        ctx.allocations,
    )
    .await?;
    if !satisfied {
        return Err(CreateError::NoCapacity(format!(
            "failed to satisfy 'usesdevice' dependencies {} for component '{}'",
            unsatisfied_ids(&component.uses_devices),
            component.identifier
        )));
    }

    for impl_index in 0..component.implementations.len() {
        let impl_id = component.implementations[impl_index].id.clone();

        // Implementation-level usesdevices live in a nested scope until
        // this implementation commits
        let mut impl_allocations = ScopedAllocations::new();
        let mut impl_assignments: Vec<DeviceAssignmentRecord> = Vec::new();
        let impl_satisfied = allocate_uses_devices(
            ctx.allocator,
            &component.identifier,
            &mut component.implementations[impl_index].uses_devices,
            &configure_properties,
            &mut impl_assignments,
            &mut impl_allocations,
        )
        .await?;
        if !impl_satisfied {
            trace!(component = %component.identifier, implementation = %impl_id,
                   "usesdevice dependencies unsatisfied, trying next implementation");
            continue;
        }

        let mut request_properties: Vec<Property> = component.implementations[impl_index]
            .dependency_properties
            .iter()
            .map(|dep| dep.to_property())
            .collect();
        if let Err(err) = evaluate_math_in_request(&mut request_properties, &configure_properties)
        {
            impl_allocations.release(ctx.allocator).await;
            return Err(err);
        }

        let request_id = Uuid::new_v4().to_string();
        let granted = match ctx
            .allocator
            .allocate_deployment(
                &request_id,
                request_properties,
                &candidates,
                &component.implementations[impl_index].processor_deps,
                &component.implementations[impl_index].os_deps,
            )
            .await
        {
            Ok(granted) => granted,
            Err(err) => {
                impl_allocations.release(ctx.allocator).await;
                return Err(err.into());
            }
        };
        let Some(granted) = granted else {
            trace!(component = %component.identifier, implementation = %impl_id,
                   "no device satisfies the deployment allocation, trying next implementation");
            impl_allocations.release(ctx.allocator).await;
            continue;
        };
        impl_allocations.push(granted.allocation_id.clone());

        if !resolve_softpkg_dependencies(
            &mut component.implementations[impl_index],
            &granted.device.profile,
        ) {
            trace!(component = %component.identifier, implementation = %impl_id,
                   "soft package dependencies unresolved, trying next implementation");
            component.selected_implementation = None;
            // The deployment allocation just acquired is released along
            // with the implementation scope before the next attempt.
            impl_allocations.release(ctx.allocator).await;
            continue;
        }

        let device_id = granted.device.identifier.clone();
        info!(component = %component.instance_id, implementation = %impl_id, device = %device_id,
              "assigned component to device");

        rotate_device_list(ctx.executable_devices, &device_id);
        ctx.assignments.push(DeviceAssignmentRecord {
            component: component.identifier.clone(),
            device: device_id.clone(),
            node: granted.device.clone(),
        });
        ctx.assignments.extend(impl_assignments);
        impl_allocations.transfer(ctx.allocations);

        component.selected_implementation = Some(impl_index);
        component.assigned_device = Some(device_id);
        return Ok(());
    }

    Err(diagnose_placement_failure(ctx, component).await)
}

/// Distinguish why no implementation could be placed: an empty domain, a
/// fully busy domain, or plain unsatisfied dependencies.
async fn diagnose_placement_failure(
    ctx: &PlacementContext<'_>,
    component: &ComponentSpec,
) -> CreateError {
    let mut executable_count = 0usize;
    let mut all_busy = true;
    for device in ctx.registered_devices {
        if device.executable {
            executable_count += 1;
            if device.remote.usage_state().await != UsageState::Busy {
                all_busy = false;
            }
        }
    }

    if executable_count == 0 {
        CreateError::NoCapacity(format!(
            "unable to launch component '{}': no executable devices are available in the domain",
            component.usage_name
        ))
    } else if all_busy {
        CreateError::NoCapacity(format!(
            "unable to launch component '{}': all executable devices in the domain are busy",
            component.usage_name
        ))
    } else {
        CreateError::NoCapacity(format!(
            "failed to satisfy device dependencies for component '{}' with id '{}'",
            component.usage_name, component.identifier
        ))
    }
}
