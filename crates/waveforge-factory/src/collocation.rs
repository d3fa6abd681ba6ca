//! Collocation group placement
//!
//! Every component of a collocation group must land on one device. The
//! planner enumerates compatible implementation tuples for the members that
//! still need a home, merges their constraints into a single consolidated
//! allocation request, and tries candidate devices until one satisfies the
//! whole group.

use crate::allocations::ScopedAllocations;
use crate::combinator::{
    consolidate_allocation_properties, enumerate_combinations, filter_compatible,
    merge_os_deps, merge_processor_deps,
};
use crate::error::{CreateError, Result};
use crate::placement::{rotate_device_list, PlacementContext};
use crate::softpkg::resolve_softpkg_dependencies;
use tracing::{debug, trace};
use uuid::Uuid;
use waveforge_platform::{AllocationManager, DeviceAssignmentRecord, DeviceNode};
use waveforge_types::{CollocationGroup, ComponentSpec, DeviceId, ImplSpec};

/// Place every member of `group` on one shared device.
///
/// Members already assigned (by a user device map) anchor the candidate
/// list; the remaining members are placed together or not at all.
pub(crate) async fn place_collocation(
    ctx: &mut PlacementContext<'_>,
    components: &mut [ComponentSpec],
    group: &CollocationGroup,
) -> Result<()> {
    debug!(group = %group.id, name = %group.name, "begin placement for collocation");

    let mut pending: Vec<usize> = Vec::new();
    let mut anchor_devices: Vec<DeviceId> = Vec::new();
    for member in &group.components {
        let index = components
            .iter()
            .position(|c| &c.instance_id == member)
            .ok_or_else(|| {
                CreateError::DescriptorInvalid(format!(
                    "collocation '{}' references unknown component '{}'",
                    group.id, member
                ))
            })?;
        match &components[index].assigned_device {
            Some(device) => {
                trace!(component = %member, device = %device, "member already assigned, anchoring group");
                anchor_devices.push(device.clone());
            }
            None => pending.push(index),
        }
    }
    if pending.is_empty() {
        return Ok(());
    }

    let tuples = {
        let members: Vec<&ComponentSpec> = pending.iter().map(|&i| &components[i]).collect();
        filter_compatible(&members, enumerate_combinations(&members))
    };

    let mut candidates: Vec<DeviceNode> = ctx.executable_devices.clone();
    if !anchor_devices.is_empty() {
        candidates.retain(|d| anchor_devices.contains(&d.identifier));
    }

    for tuple in &tuples {
        let (processor_deps, os_deps, request_properties) = {
            let impls: Vec<&ImplSpec> = pending
                .iter()
                .zip(tuple)
                .map(|(&comp_index, &impl_index)| {
                    &components[comp_index].implementations[impl_index]
                })
                .collect();
            (
                merge_processor_deps(&impls),
                merge_os_deps(&impls),
                consolidate_allocation_properties(&impls),
            )
        };

        let request_id = Uuid::new_v4().to_string();
        let Some(granted) = ctx
            .allocator
            .allocate_deployment(
                &request_id,
                request_properties,
                &candidates,
                &processor_deps,
                &os_deps,
            )
            .await?
        else {
            continue;
        };

        let mut attempt = ScopedAllocations::new();
        attempt.push(granted.allocation_id.clone());

        // Pair members with their tuple implementations in order and
        // resolve soft packages against the granted device
        let mut resolved = true;
        for (&comp_index, &impl_index) in pending.iter().zip(tuple) {
            let component = &mut components[comp_index];
            component.selected_implementation = Some(impl_index);
            if !resolve_softpkg_dependencies(
                &mut component.implementations[impl_index],
                &granted.device.profile,
            ) {
                trace!(component = %component.instance_id,
                       implementation = impl_index,
                       "soft package dependencies unresolved for collocated member");
                resolved = false;
                break;
            }
        }
        if !resolved {
            for &comp_index in &pending {
                components[comp_index].selected_implementation = None;
            }
            attempt.release(ctx.allocator).await;
            continue;
        }

        for &comp_index in &pending {
            let component = &mut components[comp_index];
            component.assigned_device = Some(granted.device.identifier.clone());
            ctx.assignments.push(DeviceAssignmentRecord {
                component: component.identifier.clone(),
                device: granted.device.identifier.clone(),
                node: granted.device.clone(),
            });
        }
        attempt.transfer(ctx.allocations);
        rotate_device_list(ctx.executable_devices, &granted.device.identifier);

        debug!(group = %group.id, device = %granted.device.identifier,
               placed = pending.len(), "completed placement for collocation");
        return Ok(());
    }

    debug!(group = %group.id, "no implementation tuple could be collocated");
    Err(CreateError::CollocationFailed {
        group: if group.name.is_empty() {
            group.id.clone()
        } else {
            group.name.clone()
        },
    })
}
