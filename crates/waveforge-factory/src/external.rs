//! External ports and properties
//!
//! An assembly may promote component ports and properties to the
//! application's surface. Names are validated for uniqueness when the
//! factory is built; the live registrations happen at the end of `create`,
//! once components exist to resolve against.

use crate::error::{CreateError, Result};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use waveforge_platform::{ApplicationHandle, RemoteComponent};
use waveforge_types::{AssemblyDescriptor, ComponentSpec, ExternalPort, ExternalProperty, PortKind};

/// Reject duplicate external port names, duplicate external property
/// names, and assembly-controller property IDs that collide with external
/// property aliases.
pub(crate) fn validate_external_names(descriptor: &AssemblyDescriptor) -> Result<()> {
    let mut port_names: HashSet<&str> = HashSet::new();
    for port in &descriptor.external_ports {
        if !port_names.insert(port.effective_name()) {
            return Err(CreateError::DescriptorInvalid(format!(
                "duplicate external port name: {}",
                port.effective_name()
            )));
        }
    }

    let mut property_names: HashSet<&str> = HashSet::new();
    for property in &descriptor.external_properties {
        if !property_names.insert(property.effective_id()) {
            return Err(CreateError::DescriptorInvalid(format!(
                "duplicate external property name: {}",
                property.effective_id()
            )));
        }
    }

    if let Some(ac_ref) = &descriptor.assembly_controller {
        if let Some(controller) = descriptor
            .components
            .iter()
            .find(|c| &c.instance_id == ac_ref)
        {
            for property in &controller.configure_properties {
                if property_names.contains(property.id.as_str()) {
                    return Err(CreateError::DescriptorInvalid(format!(
                        "assembly controller property in use as external property: {}",
                        property.id
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Resolve each external port against its component and register it on the
/// application under its effective name.
pub(crate) async fn setup_external_ports(
    application: &Arc<dyn ApplicationHandle>,
    components: &[ComponentSpec],
    ports: &[ExternalPort],
) -> Result<()> {
    debug!(count = ports.len(), "mapping external ports");
    for port in ports {
        let component = components
            .iter()
            .find(|c| c.instance_id == port.component)
            .ok_or_else(|| {
                CreateError::DescriptorInvalid(format!(
                    "invalid component reference '{}' for external port '{}'",
                    port.component,
                    port.effective_name()
                ))
            })?;

        let remote = application
            .registered_component(&component.identifier)
            .ok_or_else(|| {
                CreateError::RemoteFailure(format!(
                    "component '{}' referenced by external port '{}' is not registered",
                    component.identifier,
                    port.effective_name()
                ))
            })?;

        let endpoint = match port.kind {
            PortKind::SupportedIdentifier => {
                if !remote.supports_interface(&port.identifier).await {
                    return Err(CreateError::Internal(format!(
                        "component '{}' does not support requested interface '{}'",
                        component.identifier, port.identifier
                    )));
                }
                remote.object_ref()
            }
            PortKind::Uses | PortKind::Provides => {
                remote.get_port(&port.identifier).await.map_err(|err| {
                    CreateError::Internal(format!(
                        "invalid port identifier '{}' on component '{}': {}",
                        port.identifier, component.identifier, err
                    ))
                })?
            }
        };

        application.add_external_port(port.effective_name(), endpoint);
    }
    Ok(())
}

/// Validate each external property against its component's property set
/// and register the alias on the application.
pub(crate) fn setup_external_properties(
    application: &Arc<dyn ApplicationHandle>,
    components: &[ComponentSpec],
    properties: &[ExternalProperty],
) -> Result<()> {
    debug!(count = properties.len(), "mapping external properties");
    for property in properties {
        let component = components
            .iter()
            .find(|c| c.instance_id == property.component)
            .ok_or_else(|| {
                CreateError::DescriptorInvalid(format!(
                    "unable to find component '{}' for external property '{}'",
                    property.component,
                    property.effective_id()
                ))
            })?;

        if !component
            .configure_properties
            .iter()
            .any(|p| p.id == property.property_id)
        {
            return Err(CreateError::DescriptorInvalid(format!(
                "attempting to promote property '{}' that does not exist in component '{}'",
                property.property_id, property.component
            )));
        }

        application.add_external_property(
            property.effective_id(),
            &property.property_id,
            &component.identifier,
        );
    }
    Ok(())
}
