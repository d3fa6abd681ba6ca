//! The deploy transaction
//!
//! One `create` call is one transaction: plan, place, launch, wire,
//! configure, publish. Every phase records what it acquired — allocations,
//! loaded files, the naming context, the application servant — and any
//! failure unwinds the lot in reverse order. Nothing partial is ever
//! published to the domain.

use crate::allocations::ScopedAllocations;
use crate::collocation::place_collocation;
use crate::error::{CreateError, DeviceAssignment, Result};
use crate::external::{setup_external_ports, setup_external_properties};
use crate::placement::{allocate_component, rotate_device_list, PlacementContext};
use crate::usesdevice::{allocate_uses_devices, unsatisfied_ids};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};
use waveforge_platform::{
    AllocationManager, ApplicationBuilder, ApplicationCommit, ApplicationHandle, ApplicationInit,
    ConfigureError, ConnectionManager, ConnectionRecord, DeviceAssignmentRecord, DeviceNode,
    DomainView, EndpointRef, EndpointResolver, NamingService, PlatformError, RemoteComponent,
    RemoteDevice,
};
use waveforge_types::{
    AssemblyDescriptor, CodeType, ComponentSpec, DeviceId, Endpoint, ImplSpec, InstantiationId,
    Property, PropertyValue,
};

/// Reserved init-configuration key, stripped before any component sees the
/// configuration and forwarded only to the application handle
pub const TRUSTED_APPLICATION: &str = "TRUSTED_APPLICATION";

/// Reserved exec parameters injected before `execute`
pub const NAMING_CONTEXT_IOR: &str = "NAMING_CONTEXT_IOR";
pub const COMPONENT_IDENTIFIER: &str = "COMPONENT_IDENTIFIER";
pub const NAME_BINDING: &str = "NAME_BINDING";
pub const DOM_PATH: &str = "DOM_PATH";
pub const PROFILE_NAME: &str = "PROFILE_NAME";
pub const LOGGING_CONFIG_URI: &str = "LOGGING_CONFIG_URI";

/// State of one in-flight `create`
pub(crate) struct DeployTransaction {
    domain: Arc<dyn DomainView>,
    allocator: Arc<dyn AllocationManager>,
    naming: Arc<dyn NamingService>,
    connection_manager: Arc<dyn ConnectionManager>,
    builder: Arc<dyn ApplicationBuilder>,

    descriptor: AssemblyDescriptor,
    waveform_context: String,
    base_context: String,

    components: Vec<ComponentSpec>,
    start_order_ids: Vec<InstantiationId>,
    registered_devices: Vec<DeviceNode>,
    executable_devices: Vec<DeviceNode>,
    allocations: ScopedAllocations,
    app_used_devices: Vec<DeviceAssignmentRecord>,
    /// Soft-package loads in load order, unloaded best-effort on rollback
    softpkg_loads: Vec<(DeviceNode, String)>,
    application: Option<Arc<dyn ApplicationHandle>>,
}

impl DeployTransaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        domain: Arc<dyn DomainView>,
        allocator: Arc<dyn AllocationManager>,
        naming: Arc<dyn NamingService>,
        connection_manager: Arc<dyn ConnectionManager>,
        builder: Arc<dyn ApplicationBuilder>,
        descriptor: AssemblyDescriptor,
        waveform_context: String,
        base_context: String,
    ) -> Self {
        Self {
            domain,
            allocator,
            naming,
            connection_manager,
            builder,
            descriptor,
            waveform_context,
            base_context,
            components: Vec::new(),
            start_order_ids: Vec::new(),
            registered_devices: Vec::new(),
            executable_devices: Vec::new(),
            allocations: ScopedAllocations::new(),
            app_used_devices: Vec::new(),
            softpkg_loads: Vec::new(),
            application: None,
        }
    }

    /// Drive the whole deployment; roll back on any failure.
    pub(crate) async fn run(
        mut self,
        name: &str,
        init_configuration: Vec<Property>,
        device_assignments: &[DeviceAssignment],
    ) -> Result<Arc<dyn ApplicationHandle>> {
        match self
            .try_create(name, init_configuration, device_assignments)
            .await
        {
            Ok(application) => {
                info!(application = %application.identifier(), name, "done creating application");
                Ok(application)
            }
            Err(err) => {
                error!(error = %err, name, "application creation failed; rolling back");
                self.rollback().await;
                Err(err)
            }
        }
    }

    async fn try_create(
        &mut self,
        name: &str,
        init_configuration: Vec<Property>,
        device_assignments: &[DeviceAssignment],
    ) -> Result<Arc<dyn ApplicationHandle>> {
        // Phase 1: pre-flight
        let (trusted, init_configuration) = split_trusted_flag(init_configuration);

        self.registered_devices = self.domain.registered_devices().await?;
        self.executable_devices = self
            .registered_devices
            .iter()
            .filter(|d| d.executable)
            .cloned()
            .collect();
        if self.executable_devices.is_empty() {
            warn!("domain has no executable devices to run components");
            return Err(CreateError::NoExecutableDevices);
        }
        if let Some(last) = self.domain.last_device_used().await {
            trace!(device = %last, "placing previously used device first in deployment list");
            rotate_device_list(&mut self.executable_devices, &last);
        }

        // Phase 2: plan
        self.load_plan()?;
        self.apply_overrides(&init_configuration);

        // Phase 3: placement
        self.allocate_application_uses_devices(name).await?;
        self.assign_with_device_map(device_assignments).await?;
        self.place_collocations().await?;
        self.assign_remaining().await?;

        // Phase 4: application servant
        let application = self
            .builder
            .build(ApplicationInit {
                identifier: format!("{}:{}", self.descriptor.id, self.waveform_context),
                name: name.to_string(),
                profile: self.descriptor.profile.clone(),
                waveform_context: self.waveform_context.clone(),
                base_context: self.base_context.clone(),
                trusted,
            })
            .await?;
        self.application = Some(application.clone());

        // Phases 5-10
        self.load_and_execute(&application).await?;
        self.wait_for_registration(&application).await?;
        let start_sequence = self.initialize_components(&application).await?;
        self.check_assembly_controller(&application)?;
        let connections = self.connect_components(&application).await?;
        self.configure_components(&application).await?;
        setup_external_ports(&application, &self.components, &self.descriptor.external_ports)
            .await?;
        setup_external_properties(
            &application,
            &self.components,
            &self.descriptor.external_properties,
        )?;

        // Phase 11: commit
        let allocation_ids = self.allocations.take();
        let commit = ApplicationCommit {
            assembly_controller: self
                .assembly_controller_index()
                .map(|i| self.components[i].identifier.clone()),
            used_devices: self.app_used_devices.clone(),
            start_sequence,
            connections,
            allocation_ids: allocation_ids.clone(),
        };
        if let Err(err) = application.commit(commit).await {
            // Allocation ownership stays with the transaction so rollback
            // can release it
            for id in allocation_ids {
                self.allocations.push(id);
            }
            return Err(err.into());
        }
        if let Err(err) = self.domain.add_application(application.clone()).await {
            for id in allocation_ids {
                self.allocations.push(id);
            }
            return Err(err.into());
        }
        self.domain
            .set_last_device_used(self.executable_devices[0].identifier.clone())
            .await;

        Ok(application)
    }

    /// Build the component plan: uniquified identifiers, assembly
    /// controller designation, naming defaults, start order bins.
    fn load_plan(&mut self) -> Result<()> {
        self.components = std::mem::take(&mut self.descriptor.components);
        let controller_ref = self.descriptor.assembly_controller.clone();

        let mut seen: HashSet<InstantiationId> = HashSet::new();
        let mut start_orders: BTreeMap<i32, Vec<InstantiationId>> = BTreeMap::new();

        for component in &mut self.components {
            if !seen.insert(component.instance_id.clone()) {
                return Err(CreateError::DescriptorInvalid(format!(
                    "duplicate component instantiation id '{}'",
                    component.instance_id
                )));
            }
            if component.spd_path.is_empty() {
                return Err(CreateError::DescriptorInvalid(format!(
                    "the software package reference for component '{}' is missing",
                    component.instance_id
                )));
            }

            component.identifier =
                format!("{}:{}", component.instance_id, self.waveform_context);
            component.is_assembly_controller =
                controller_ref.as_ref() == Some(&component.instance_id);

            if component.uses_naming_service {
                if component.naming_service_name.is_none() {
                    component.naming_service_name = Some(component.instance_id.to_string());
                }
            } else if component.is_sca_compliant {
                warn!(component = %component.instance_id,
                      "component is SCA compliant but does not provide a naming service name");
            }

            if !component.is_assembly_controller {
                if let Some(order) = component.start_order {
                    start_orders
                        .entry(order)
                        .or_default()
                        .push(component.instance_id.clone());
                }
            }
        }

        self.start_order_ids = start_orders.into_values().flatten().collect();
        Ok(())
    }

    /// Apply the caller's init configuration: assembly controller
    /// overrides, then external property overrides onto their targets.
    fn apply_overrides(&mut self, init_configuration: &[Property]) {
        if let Some(index) = self.assembly_controller_index() {
            for property in init_configuration {
                let controller = &mut self.components[index];
                if property.id == LOGGING_CONFIG_URI {
                    // The component's own exec parameter wins over the
                    // domain-wide override
                    if controller.exec_parameter(LOGGING_CONFIG_URI).is_none() {
                        trace!(value = %property.value,
                               "adding LOGGING_CONFIG_URI exec parameter from init configuration");
                        controller.add_exec_parameter(property.clone());
                    }
                } else if !controller.override_property(&property.id, property.value.clone()) {
                    debug!(property = %property.id,
                           "init configuration entry matches no assembly controller property");
                }
            }
        }

        for property in init_configuration {
            let Some(external) = self
                .descriptor
                .external_properties
                .iter()
                .find(|e| e.effective_id() == property.id)
            else {
                continue;
            };
            let target_id = external.property_id.clone();
            let Some(index) = self
                .components
                .iter()
                .position(|c| c.instance_id == external.component)
            else {
                continue;
            };
            // Only non-controller targets; the controller was handled above
            if self.components[index].is_assembly_controller {
                continue;
            }
            self.components[index].override_property(&target_id, property.value.clone());
        }
    }

    async fn allocate_application_uses_devices(&mut self, name: &str) -> Result<()> {
        if self.descriptor.uses_devices.is_empty() {
            return Ok(());
        }
        debug!(
            count = self.descriptor.uses_devices.len(),
            "allocating application usesdevice dependencies"
        );
        let configure = self
            .assembly_controller_index()
            .map(|i| self.components[i].configure_properties.clone())
            .unwrap_or_default();

        let mut uses = std::mem::take(&mut self.descriptor.uses_devices);
        // Assembly-level assignments are kept on the specs for connection
        // lookups but never attributed to a component
        let mut discarded = Vec::new();
        let outcome = allocate_uses_devices(
            self.allocator.as_ref(),
            name,
            &mut uses,
            &configure,
            &mut discarded,
            &mut self.allocations,
        )
        .await;
        self.descriptor.uses_devices = uses;

        if outcome? {
            Ok(())
        } else {
            Err(CreateError::NoCapacity(format!(
                "failed to satisfy 'usesdevice' dependencies {} for application '{}'",
                unsatisfied_ids(&self.descriptor.uses_devices),
                name
            )))
        }
    }

    async fn assign_with_device_map(
        &mut self,
        device_assignments: &[DeviceAssignment],
    ) -> Result<()> {
        if device_assignments.is_empty() {
            return Ok(());
        }
        debug!(
            count = device_assignments.len(),
            "assigning components from the caller's device assignment map"
        );
        for assignment in device_assignments {
            let Some(index) = self
                .components
                .iter()
                .position(|c| c.instance_id == assignment.component)
            else {
                error!(component = %assignment.component,
                       "device assignment names an unknown component");
                return Err(CreateError::BadAssignment {
                    assignments: vec![assignment.clone()],
                });
            };

            let Self {
                allocator,
                registered_devices,
                executable_devices,
                allocations,
                app_used_devices,
                components,
                ..
            } = self;
            let mut ctx = PlacementContext {
                allocator: allocator.as_ref(),
                registered_devices,
                executable_devices,
                allocations,
                assignments: app_used_devices,
            };
            allocate_component(&mut ctx, &mut components[index], Some(&assignment.device))
                .await?;
        }
        Ok(())
    }

    async fn place_collocations(&mut self) -> Result<()> {
        if self.descriptor.collocations.is_empty() {
            return Ok(());
        }
        debug!(
            count = self.descriptor.collocations.len(),
            "assigning collocated groups of components"
        );
        let groups = std::mem::take(&mut self.descriptor.collocations);
        for group in &groups {
            let Self {
                allocator,
                registered_devices,
                executable_devices,
                allocations,
                app_used_devices,
                components,
                ..
            } = self;
            let mut ctx = PlacementContext {
                allocator: allocator.as_ref(),
                registered_devices,
                executable_devices,
                allocations,
                assignments: app_used_devices,
            };
            place_collocation(&mut ctx, components, group).await?;
        }
        self.descriptor.collocations = groups;
        Ok(())
    }

    async fn assign_remaining(&mut self) -> Result<()> {
        for index in 0..self.components.len() {
            if self.components[index].is_assigned() {
                continue;
            }
            let Self {
                allocator,
                registered_devices,
                executable_devices,
                allocations,
                app_used_devices,
                components,
                ..
            } = self;
            let mut ctx = PlacementContext {
                allocator: allocator.as_ref(),
                registered_devices,
                executable_devices,
                allocations,
                assignments: app_used_devices,
            };
            allocate_component(&mut ctx, &mut components[index], None).await?;
        }
        Ok(())
    }

    /// Phase 5: on each component's assigned device, load soft-package
    /// dependencies and the code file, then execute where the
    /// implementation calls for it.
    async fn load_and_execute(&mut self, application: &Arc<dyn ApplicationHandle>) -> Result<()> {
        debug!(count = self.components.len(), "loading and executing components");
        let file_manager = self.domain.file_manager_uri();

        for index in 0..self.components.len() {
            let identifier = self.components[index].identifier.clone();
            let spd_path = self.components[index].spd_path.clone();

            let Some(impl_index) = self.components[index].selected_implementation else {
                return Err(CreateError::Internal(format!(
                    "component '{}' has no selected implementation",
                    identifier
                )));
            };
            let Some(device_id) = self.components[index].assigned_device.clone() else {
                return Err(CreateError::Internal(format!(
                    "component '{}' was not assigned to a device",
                    identifier
                )));
            };
            let device = self
                .find_device_node(&device_id)
                .ok_or_else(|| {
                    CreateError::Internal(format!(
                        "assigned device '{}' is no longer known",
                        device_id
                    ))
                })?
                .clone();

            trace!(component = %identifier, device = %device.label, "deploying component");

            application.add_component(&identifier, &spd_path);
            application.set_component_implementation(
                &identifier,
                &self.components[index].implementations[impl_index].id,
            );
            if self.components[index].uses_naming_service {
                let binding = self.components[index]
                    .naming_service_name
                    .clone()
                    .unwrap_or_default();
                let lookup = format!("{}/{}", self.base_context, binding);
                application.set_component_naming_context(&identifier, &lookup);
            }
            application.set_component_device(&identifier, &device);

            // Soft-package dependencies load first, nested before outer
            let mut dependency_loads = Vec::new();
            collect_softpkg_loads(
                &self.components[index].implementations[impl_index],
                &mut dependency_loads,
            )?;
            for (path, code_type) in dependency_loads {
                debug!(file = %path, device = %device.label, "loading soft package dependency");
                self.softpkg_loads.push((device.clone(), path.clone()));
                device
                    .remote
                    .load(&file_manager, &path, code_type)
                    .await
                    .map_err(|err| {
                        CreateError::RemoteFailure(format!(
                            "failed to load dependency file '{}' on device '{}': {}",
                            path, device_id, err
                        ))
                    })?;
                application.add_component_loaded_file(&identifier, &path);
            }

            // The component's own code file
            let implementation = &self.components[index].implementations[impl_index];
            if implementation.local_file.is_empty() {
                return Err(CreateError::DescriptorInvalid(format!(
                    "code file is empty for component '{}' implementation '{}'",
                    identifier, implementation.id
                )));
            }
            let code_path = resolve_code_path(&spd_path, &implementation.local_file);
            trace!(file = %code_path, device = %device.label, "loading component code");
            device
                .remote
                .load(&file_manager, &code_path, implementation.code_type)
                .await
                .map_err(|err| {
                    CreateError::RemoteFailure(format!(
                        "'load' failed for component '{}' implementation '{}' on device '{}': {}",
                        identifier, implementation.id, device_id, err
                    ))
                })?;
            application.add_component_loaded_file(&identifier, &code_path);

            if !implementation.is_executed() {
                continue;
            }
            if implementation.code_type == CodeType::Executable
                && implementation.entry_point.is_none()
            {
                warn!(component = %identifier,
                      "executing the code file directly; no entry point was declared");
            }
            let execute_path = resolve_code_path(&spd_path, implementation.execute_path());

            self.add_reserved_exec_parameters(index, application);

            let parameters = self.components[index].exec_parameters.clone();
            for parameter in &parameters {
                trace!(id = %parameter.id, value = %parameter.value, "exec parameter");
            }
            let pid = device
                .remote
                .execute(&execute_path, &[], &parameters)
                .await
                .map_err(|err| {
                    CreateError::RemoteFailure(format!(
                        "'execute' failed for component '{}' on device '{}': {}",
                        identifier, device_id, err
                    ))
                })?;
            if pid < 0 {
                return Err(CreateError::ExecuteFailed {
                    component: identifier,
                });
            }
            application.set_component_pid(&identifier, pid);
        }
        Ok(())
    }

    /// Inject the reserved exec parameters, never clobbering a
    /// LOGGING_CONFIG_URI the component already carries.
    fn add_reserved_exec_parameters(
        &mut self,
        index: usize,
        application: &Arc<dyn ApplicationHandle>,
    ) {
        let registrar = application.registrar_uri();
        let base_context = self.base_context.clone();
        let logging_default = self.domain.property(LOGGING_CONFIG_URI);
        let file_manager = self.domain.file_manager_uri();

        let component = &mut self.components[index];
        component.add_exec_parameter(Property::new(
            NAMING_CONTEXT_IOR,
            PropertyValue::Str(registrar),
        ));
        component.add_exec_parameter(Property::new(
            COMPONENT_IDENTIFIER,
            PropertyValue::Str(component.identifier.clone()),
        ));
        component.add_exec_parameter(Property::new(
            NAME_BINDING,
            PropertyValue::Str(component.naming_service_name.clone().unwrap_or_default()),
        ));
        component.add_exec_parameter(Property::new(
            DOM_PATH,
            PropertyValue::Str(base_context),
        ));
        component.add_exec_parameter(Property::new(
            PROFILE_NAME,
            PropertyValue::Str(component.spd_path.clone()),
        ));

        if component.exec_parameter(LOGGING_CONFIG_URI).is_none() {
            match logging_default {
                Some(property) => {
                    component
                        .add_exec_parameter(Property::new(LOGGING_CONFIG_URI, property.value));
                }
                None => trace!("domain LOGGING_CONFIG_URI is not set"),
            }
        }

        // Logging URIs on the domain file system need the file manager
        // reference appended so the launched process can reach them
        let rewritten = component
            .exec_parameter(LOGGING_CONFIG_URI)
            .and_then(|p| p.value.as_str())
            .filter(|uri| uri.starts_with("sca:") && !uri.contains("?fs="))
            .map(|uri| format!("{}?fs={}", uri, file_manager));
        if let Some(uri) = rewritten {
            trace!(uri = %uri, "adding file system reference to logging URI");
            component.add_exec_parameter(Property::new(
                LOGGING_CONFIG_URI,
                PropertyValue::Str(uri),
            ));
        }
    }

    /// Phase 6: block until every SCA-compliant component has registered.
    async fn wait_for_registration(
        &self,
        application: &Arc<dyn ApplicationHandle>,
    ) -> Result<()> {
        let timeout = self.domain.component_binding_timeout();
        let expected: HashSet<String> = self
            .components
            .iter()
            .filter(|c| c.is_sca_compliant)
            .map(|c| c.identifier.clone())
            .collect();
        if expected.is_empty() {
            return Ok(());
        }

        debug!(timeout = ?timeout, components = expected.len(),
               "waiting for components to register");
        let start = std::time::Instant::now();
        if !application.wait_for_components(&expected, timeout).await {
            let elapsed = start.elapsed();
            let missing = self
                .components
                .iter()
                .find(|c| {
                    c.is_sca_compliant
                        && application.registered_component(&c.identifier).is_none()
                })
                .map(|c| c.identifier.clone())
                .unwrap_or_else(|| "<unknown>".to_string());
            error!(component = %missing, elapsed = ?elapsed,
                   "timed out waiting for component to register");
            return Err(CreateError::RegistrationTimeout {
                component: missing,
                elapsed,
            });
        }
        Ok(())
    }

    /// Phase 7: initialize SCA-compliant resources and assemble the start
    /// sequence from the start-order bins.
    async fn initialize_components(
        &self,
        application: &Arc<dyn ApplicationHandle>,
    ) -> Result<Vec<String>> {
        debug!(count = self.components.len(), "initializing waveform components");
        let mut start_sequence: Vec<Option<String>> = vec![None; self.start_order_ids.len()];

        for component in &self.components {
            if !component.is_sca_compliant || !component.is_resource {
                continue;
            }
            let resource = application
                .registered_component(&component.identifier)
                .ok_or_else(|| {
                    CreateError::RemoteFailure(format!(
                        "registered component lookup failed for '{}'",
                        component.identifier
                    ))
                })?;

            trace!(component = %component.identifier, "initializing component");
            if let Err(err) = resource.initialize().await {
                for message in &err.messages {
                    error!(component = %component.identifier, message = %message,
                           "initialize reported failure");
                }
                return Err(CreateError::RemoteFailure(format!(
                    "unable to initialize component '{}'",
                    component.identifier
                )));
            }

            if !component.is_assembly_controller {
                if let Some(position) = self
                    .start_order_ids
                    .iter()
                    .position(|id| id == &component.instance_id)
                {
                    start_sequence[position] = Some(component.identifier.clone());
                }
            }
        }

        Ok(start_sequence.into_iter().flatten().collect())
    }

    /// A declared SCA-compliant assembly controller must have registered.
    fn check_assembly_controller(&self, application: &Arc<dyn ApplicationHandle>) -> Result<()> {
        let Some(index) = self.assembly_controller_index() else {
            return Ok(());
        };
        let controller = &self.components[index];
        if controller.is_sca_compliant
            && application
                .registered_component(&controller.identifier)
                .is_none()
        {
            return Err(CreateError::Internal(
                "assembly controller is not SCA compliant or has not been assigned".to_string(),
            ));
        }
        Ok(())
    }

    /// Phase 8: resolve connections in reverse declaration order.
    async fn connect_components(
        &self,
        application: &Arc<dyn ApplicationHandle>,
    ) -> Result<Vec<ConnectionRecord>> {
        debug!(
            count = self.descriptor.connections.len(),
            "establishing waveform connections"
        );
        let resolver = PlanResolver {
            transaction: self,
            application: application.as_ref(),
        };
        let mut records = Vec::with_capacity(self.descriptor.connections.len());
        for connection in self.descriptor.connections.iter().rev() {
            trace!(connection = %connection.id, "processing connection");
            match self
                .connection_manager
                .resolve_connection(connection, &resolver)
                .await
            {
                Ok(record) => records.push(record),
                Err(err) => {
                    error!(connection = %connection.id, error = %err, "unable to make connection");
                    return Err(CreateError::RemoteFailure(format!(
                        "unable to make connection '{}': {}",
                        connection.id, err
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Phase 9: configure non-controller components, then the assembly
    /// controller last.
    async fn configure_components(&self, application: &Arc<dyn ApplicationHandle>) -> Result<()> {
        for controller_pass in [false, true] {
            for component in &self.components {
                if component.is_assembly_controller != controller_pass {
                    continue;
                }
                if !component.is_sca_compliant
                    || !component.is_resource
                    || !component.uses_naming_service
                {
                    continue;
                }
                if !component.has_configure_values() {
                    continue;
                }

                let resource = application
                    .registered_component(&component.identifier)
                    .ok_or_else(|| {
                        CreateError::RemoteFailure(format!(
                            "could not get component reference for '{}'",
                            component.identifier
                        ))
                    })?;

                let properties = component.non_nil_configure_properties();
                trace!(component = %component.identifier, count = properties.len(),
                       "configuring component");
                if let Err(err) = resource.configure(&properties).await {
                    error!(component = %component.identifier, error = %err, "configure failed");
                    return Err(match err {
                        ConfigureError::InvalidConfiguration {
                            invalid_properties, ..
                        }
                        | ConfigureError::PartialConfiguration { invalid_properties } => {
                            CreateError::InvalidInitConfiguration { invalid_properties }
                        }
                        ConfigureError::Other(message) => CreateError::RemoteFailure(format!(
                            "configure failed for component '{}': {}",
                            component.identifier, message
                        )),
                    });
                }
            }
        }
        Ok(())
    }

    /// Unwind everything a failed create left behind, in reverse order of
    /// acquisition. Every step is best-effort.
    async fn rollback(&mut self) {
        if let Some(application) = &self.application {
            debug!(application = %application.identifier(), "cleaning up failed application");
            application.release_components().await;
            application.terminate_components().await;
            application.unload_components().await;
            application.cleanup_activations().await;
        }

        for (device, path) in &self.softpkg_loads {
            if !device.remote.alive() {
                warn!(device = %device.identifier, file = %path,
                      "device unreachable; cannot unload soft package dependency");
                continue;
            }
            if let Err(err) = device.remote.unload(path).await {
                warn!(device = %device.identifier, file = %path, error = %err,
                      "unable to unload soft package dependency");
            }
        }

        trace!(context = %self.base_context, "removing waveform naming context");
        if let Err(err) = self.naming.unbind_children(&self.base_context).await {
            warn!(error = %err, "could not unbind contents of the waveform naming context");
        }
        if let Err(err) = self.naming.destroy_context(&self.base_context).await {
            warn!(error = %err, "could not destroy the waveform naming context");
        }

        self.allocations.release(self.allocator.as_ref()).await;
    }

    fn assembly_controller_index(&self) -> Option<usize> {
        self.components.iter().position(|c| c.is_assembly_controller)
    }

    fn component_by_instance(&self, id: &InstantiationId) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| &c.instance_id == id)
    }

    fn find_device_node(&self, id: &DeviceId) -> Option<&DeviceNode> {
        self.registered_devices
            .iter()
            .find(|d| &d.identifier == id)
            .or_else(|| {
                self.app_used_devices
                    .iter()
                    .find(|a| &a.device == id)
                    .map(|a| &a.node)
            })
    }
}

/// Endpoint resolution against the deployment in progress, handed to the
/// connection manager
struct PlanResolver<'a> {
    transaction: &'a DeployTransaction,
    application: &'a dyn ApplicationHandle,
}

impl PlanResolver<'_> {
    fn registered(
        &self,
        component: &InstantiationId,
    ) -> waveforge_platform::Result<Arc<dyn RemoteComponent>> {
        let spec = self
            .transaction
            .component_by_instance(component)
            .ok_or_else(|| PlatformError::Connection {
                id: component.to_string(),
                reason: "endpoint references an unknown component".to_string(),
            })?;
        self.application
            .registered_component(&spec.identifier)
            .ok_or_else(|| PlatformError::Connection {
                id: component.to_string(),
                reason: "endpoint component is not registered".to_string(),
            })
    }
}

#[async_trait]
impl EndpointResolver for PlanResolver<'_> {
    async fn resolve_endpoint(
        &self,
        endpoint: &Endpoint,
    ) -> waveforge_platform::Result<EndpointRef> {
        match endpoint {
            Endpoint::ComponentPort { component, port } => {
                self.registered(component)?.get_port(port).await
            }
            Endpoint::ComponentSupportedInterface { component, .. } => {
                Ok(self.registered(component)?.object_ref())
            }
            Endpoint::DeviceUsedByComponent { component, uses_id } => {
                let spec = self
                    .transaction
                    .component_by_instance(component)
                    .ok_or_else(|| PlatformError::Connection {
                        id: component.to_string(),
                        reason: "endpoint references an unknown component".to_string(),
                    })?;
                let device = spec
                    .uses_devices
                    .iter()
                    .find(|u| u.id == *uses_id)
                    .and_then(|u| u.assigned_device.clone())
                    .ok_or_else(|| PlatformError::Connection {
                        id: uses_id.clone(),
                        reason: "usesdevice has no assigned device".to_string(),
                    })?;
                Ok(EndpointRef::new(format!("device://{}", device)))
            }
            Endpoint::DeviceUsedByApplication { uses_id } => {
                let device = self
                    .transaction
                    .descriptor
                    .uses_devices
                    .iter()
                    .find(|u| u.id == *uses_id)
                    .and_then(|u| u.assigned_device.clone())
                    .ok_or_else(|| PlatformError::Connection {
                        id: uses_id.clone(),
                        reason: "application usesdevice has no assigned device".to_string(),
                    })?;
                Ok(EndpointRef::new(format!("device://{}", device)))
            }
        }
    }
}

/// Pull the reserved trusted-application flag out of the init
/// configuration; defaults to trusted.
fn split_trusted_flag(init_configuration: Vec<Property>) -> (bool, Vec<Property>) {
    let mut trusted = true;
    let mut rest = Vec::with_capacity(init_configuration.len());
    for property in init_configuration {
        if property.id == TRUSTED_APPLICATION {
            if let PropertyValue::Boolean(value) = property.value {
                trusted = value;
            }
        } else {
            rest.push(property);
        }
    }
    (trusted, rest)
}

/// Collect the code files of every selected soft-package dependency in
/// load order: nested dependencies before the package that needs them.
fn collect_softpkg_loads(
    implementation: &ImplSpec,
    out: &mut Vec<(String, CodeType)>,
) -> Result<()> {
    for dependency in &implementation.softpkg_deps {
        let selected = dependency.selected_impl().ok_or_else(|| {
            CreateError::Internal(format!(
                "no implementation selected for dependency '{}'",
                dependency.name
            ))
        })?;
        collect_softpkg_loads(selected, out)?;
        out.push((
            resolve_code_path(&dependency.spd_path, &selected.local_file),
            selected.code_type,
        ));
    }
    Ok(())
}

/// Resolve a code file against the directory of its package descriptor;
/// absolute paths pass through.
fn resolve_code_path(spd_path: &str, local_file: &str) -> String {
    if local_file.starts_with('/') {
        return local_file.to_string();
    }
    match spd_path.rsplit_once('/') {
        Some((dir, _)) if !dir.is_empty() => format!("{}/{}", dir, local_file),
        _ => local_file.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_flag_is_stripped_and_defaulted() {
        let (trusted, rest) = split_trusted_flag(vec![
            Property::new("gain", PropertyValue::Double(2.0)),
            Property::new(TRUSTED_APPLICATION, PropertyValue::Boolean(false)),
        ]);
        assert!(!trusted);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "gain");

        let (trusted, rest) = split_trusted_flag(vec![]);
        assert!(trusted);
        assert!(rest.is_empty());
    }

    #[test]
    fn code_paths_resolve_against_the_descriptor_directory() {
        assert_eq!(
            resolve_code_path("/components/c1/c1.spd.xml", "cpp/c1"),
            "/components/c1/cpp/c1"
        );
        assert_eq!(
            resolve_code_path("/components/c1/c1.spd.xml", "/abs/c1"),
            "/abs/c1"
        );
        assert_eq!(resolve_code_path("c1.spd.xml", "c1"), "c1");
    }

    #[test]
    fn softpkg_loads_are_collected_nested_first() {
        use waveforge_types::SoftPkgDep;

        let mut inner_impl = ImplSpec::new("inner-1", "inner.so");
        inner_impl.code_type = CodeType::SharedLibrary;
        let mut inner = SoftPkgDep::new("inner", "/deps/inner/inner.spd.xml");
        inner.implementations.push(inner_impl);
        inner.selected = Some(0);

        let mut outer_impl = ImplSpec::new("outer-1", "outer.so");
        outer_impl.code_type = CodeType::SharedLibrary;
        outer_impl.softpkg_deps.push(inner);
        let mut outer = SoftPkgDep::new("outer", "/deps/outer/outer.spd.xml");
        outer.implementations.push(outer_impl);
        outer.selected = Some(0);

        let mut component_impl = ImplSpec::new("comp-1", "comp");
        component_impl.softpkg_deps.push(outer);

        let mut loads = Vec::new();
        collect_softpkg_loads(&component_impl, &mut loads).unwrap();
        assert_eq!(
            loads.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>(),
            vec!["/deps/inner/inner.so", "/deps/outer/outer.so"]
        );
    }

    #[test]
    fn unselected_dependency_is_an_internal_error() {
        use waveforge_types::SoftPkgDep;

        let mut dep = SoftPkgDep::new("dep", "/deps/dep/dep.spd.xml");
        dep.implementations.push(ImplSpec::new("d1", "d.so"));

        let mut component_impl = ImplSpec::new("comp-1", "comp");
        component_impl.softpkg_deps.push(dep);

        let mut loads = Vec::new();
        assert!(collect_softpkg_loads(&component_impl, &mut loads).is_err());
    }
}
