//! Assembly descriptor records
//!
//! The descriptor loader (external to this workspace) parses assembly and
//! implementation descriptor files and yields these typed records. The
//! factory never touches descriptor syntax; it consumes this model.

use crate::ids::{DeviceId, InstantiationId};
use crate::property::{Property, PropertyRef, PropertyValue};
use serde::{Deserialize, Serialize};

/// Everything the loader yields for one waveform assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyDescriptor {
    /// Descriptor identifier (the software assembly ID)
    pub id: String,

    /// Human-readable assembly name
    pub name: String,

    /// Path of the assembly descriptor file
    pub profile: String,

    /// Descriptor version, when the assembly declares one
    pub version: Option<semver::Version>,

    /// Instantiation ID of the assembly controller, if one is designated
    pub assembly_controller: Option<InstantiationId>,

    /// Component instantiations in declaration order
    pub components: Vec<ComponentSpec>,

    /// Host collocation groups
    pub collocations: Vec<CollocationGroup>,

    /// Assembly-level usesdevice dependencies
    pub uses_devices: Vec<UsesDeviceSpec>,

    /// Connections in declaration order
    pub connections: Vec<ConnectionSpec>,

    /// Externally visible ports
    pub external_ports: Vec<ExternalPort>,

    /// Externally visible properties
    pub external_properties: Vec<ExternalProperty>,
}

impl AssemblyDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            profile: format!("/waveforms/{}/{}.sad.xml", name, name),
            name,
            version: None,
            assembly_controller: None,
            components: Vec::new(),
            collocations: Vec::new(),
            uses_devices: Vec::new(),
            connections: Vec::new(),
            external_ports: Vec::new(),
            external_properties: Vec::new(),
        }
    }
}

/// One component instantiation from the assembly descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentSpec {
    /// Instantiation ID from the descriptor; lookup key for device
    /// assignment maps, collocations, and external references
    pub instance_id: InstantiationId,

    /// Runtime identifier, uniquified per deployment as
    /// `"{instance_id}:{waveform_context}"` during the plan phase
    pub identifier: String,

    /// Usage name from the instantiation element
    pub usage_name: String,

    /// Path of the component's software package descriptor
    pub spd_path: String,

    pub is_assembly_controller: bool,
    pub is_sca_compliant: bool,
    pub is_resource: bool,
    pub uses_naming_service: bool,

    /// Name the component binds under the waveform context
    pub naming_service_name: Option<String>,

    /// Declared numeric start order; `None` keeps the component out of the
    /// published start sequence
    pub start_order: Option<i32>,

    /// Configure properties from the property descriptor, with any
    /// instantiation overrides already applied by the loader
    pub configure_properties: Vec<Property>,

    /// Exec parameters in declaration order
    pub exec_parameters: Vec<Property>,

    /// Candidate implementations in declaration order
    pub implementations: Vec<ImplSpec>,

    /// Component-level usesdevice dependencies
    pub uses_devices: Vec<UsesDeviceSpec>,

    /// Index into `implementations`, set by placement
    pub selected_implementation: Option<usize>,

    /// Device chosen by placement
    pub assigned_device: Option<DeviceId>,
}

impl ComponentSpec {
    /// Create a spec with defaults matching a minimal SCA-compliant resource
    pub fn with_id(instance_id: impl Into<String>, spd_path: impl Into<String>) -> Self {
        let instance_id = InstantiationId::new(instance_id);
        Self {
            identifier: instance_id.as_str().to_string(),
            usage_name: instance_id.as_str().to_string(),
            instance_id,
            spd_path: spd_path.into(),
            is_assembly_controller: false,
            is_sca_compliant: true,
            is_resource: true,
            uses_naming_service: true,
            naming_service_name: None,
            start_order: None,
            configure_properties: Vec::new(),
            exec_parameters: Vec::new(),
            implementations: Vec::new(),
            uses_devices: Vec::new(),
            selected_implementation: None,
            assigned_device: None,
        }
    }

    /// The implementation chosen by placement, if any
    pub fn selected_impl(&self) -> Option<&ImplSpec> {
        self.selected_implementation
            .and_then(|idx| self.implementations.get(idx))
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_device.is_some()
    }

    /// Override a property value by ID. Configure properties win over exec
    /// parameters; unknown IDs are ignored and reported as `false` so the
    /// caller can log.
    pub fn override_property(&mut self, id: &str, value: PropertyValue) -> bool {
        if let Some(prop) = self.configure_properties.iter_mut().find(|p| p.id == id) {
            prop.value = value;
            return true;
        }
        if let Some(prop) = self.exec_parameters.iter_mut().find(|p| p.id == id) {
            prop.value = value;
            return true;
        }
        false
    }

    /// Add or replace an exec parameter
    pub fn add_exec_parameter(&mut self, property: Property) {
        if let Some(existing) = self
            .exec_parameters
            .iter_mut()
            .find(|p| p.id == property.id)
        {
            existing.value = property.value;
        } else {
            self.exec_parameters.push(property);
        }
    }

    pub fn exec_parameter(&self, id: &str) -> Option<&Property> {
        self.exec_parameters.iter().find(|p| p.id == id)
    }

    /// Configure properties with a value set, the only ones passed to
    /// `configure`
    pub fn non_nil_configure_properties(&self) -> Vec<Property> {
        self.configure_properties
            .iter()
            .filter(|p| !p.value.is_nil())
            .cloned()
            .collect()
    }

    /// Whether there is anything to configure on this component
    pub fn has_configure_values(&self) -> bool {
        self.configure_properties.iter().any(|p| !p.value.is_nil())
    }
}

/// One candidate implementation of a component or soft package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplSpec {
    pub id: String,

    /// Processor families this implementation runs on; empty means
    /// unconstrained
    pub processor_deps: Vec<String>,

    /// Operating systems this implementation runs on; empty means
    /// unconstrained
    pub os_deps: Vec<OsDep>,

    pub code_type: CodeType,

    /// Entry point for executable code; shared libraries with an entry
    /// point are executed, without one they are load-only
    pub entry_point: Option<String>,

    /// Code file to load on the assigned device
    pub local_file: String,

    /// Allocation dependencies cast into the request sent to the
    /// allocation manager
    pub dependency_properties: Vec<PropertyRef>,

    /// Soft packages that must load on the same device first
    pub softpkg_deps: Vec<SoftPkgDep>,

    /// Implementation-level usesdevice dependencies
    pub uses_devices: Vec<UsesDeviceSpec>,
}

impl ImplSpec {
    pub fn new(id: impl Into<String>, local_file: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            processor_deps: Vec::new(),
            os_deps: Vec::new(),
            code_type: CodeType::Executable,
            entry_point: None,
            local_file: local_file.into(),
            dependency_properties: Vec::new(),
            softpkg_deps: Vec::new(),
            uses_devices: Vec::new(),
        }
    }

    /// Whether this implementation is launched with `execute` after loading
    pub fn is_executed(&self) -> bool {
        match self.code_type {
            CodeType::Executable => true,
            CodeType::SharedLibrary => self.entry_point.is_some(),
            CodeType::Driver | CodeType::KernelModule => false,
        }
    }

    /// The path handed to `execute`: the entry point when declared,
    /// otherwise the code file itself
    pub fn execute_path(&self) -> &str {
        self.entry_point.as_deref().unwrap_or(&self.local_file)
    }

    /// Drop all soft-package selections, recursively
    pub fn clear_dependency_selections(&mut self) {
        for dep in &mut self.softpkg_deps {
            dep.clear_selection();
        }
    }
}

/// A soft-package dependency: a sub-package loaded on the same device
/// before the component runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftPkgDep {
    pub name: String,
    pub spd_path: String,

    /// Candidate implementations of the dependency
    pub implementations: Vec<ImplSpec>,

    /// Index into `implementations`, set during dependency resolution
    pub selected: Option<usize>,
}

impl SoftPkgDep {
    pub fn new(name: impl Into<String>, spd_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spd_path: spd_path.into(),
            implementations: Vec::new(),
            selected: None,
        }
    }

    pub fn selected_impl(&self) -> Option<&ImplSpec> {
        self.selected.and_then(|idx| self.implementations.get(idx))
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        for imp in &mut self.implementations {
            imp.clear_dependency_selections();
        }
    }
}

/// Declarative capacity dependency satisfied by any device in the domain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsesDeviceSpec {
    pub id: String,

    /// Capacity request properties; values may carry `__MATH__` expressions
    pub property_refs: Vec<PropertyRef>,

    /// Device that satisfied the request, set during allocation
    pub assigned_device: Option<DeviceId>,
}

impl UsesDeviceSpec {
    pub fn new(id: impl Into<String>, property_refs: Vec<PropertyRef>) -> Self {
        Self {
            id: id.into(),
            property_refs,
            assigned_device: None,
        }
    }
}

/// Code file kinds; drivers and kernel modules are load-only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeType {
    Executable,
    SharedLibrary,
    Driver,
    KernelModule,
}

/// Operating system requirement as a name/version pair; matching is exact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OsDep {
    pub name: String,
    pub version: String,
}

impl OsDep {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A group of components that must share one host device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollocationGroup {
    pub id: String,
    pub name: String,
    pub components: Vec<InstantiationId>,
}

/// A declared connection between two endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub id: String,
    pub uses: Endpoint,
    pub provides: Endpoint,
}

/// One side of a connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Endpoint {
    /// A named port on a component
    ComponentPort {
        component: InstantiationId,
        port: String,
    },
    /// The component object itself, for supported-interface connections
    ComponentSupportedInterface {
        component: InstantiationId,
        interface: String,
    },
    /// The device a component's usesdevice resolved to
    DeviceUsedByComponent {
        component: InstantiationId,
        uses_id: String,
    },
    /// The device an assembly-level usesdevice resolved to
    DeviceUsedByApplication { uses_id: String },
}

/// Port promoted to the application's external surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPort {
    pub component: InstantiationId,
    pub identifier: String,
    pub external_name: Option<String>,
    pub kind: PortKind,
}

impl ExternalPort {
    /// Name the port is registered under on the application
    pub fn effective_name(&self) -> &str {
        self.external_name.as_deref().unwrap_or(&self.identifier)
    }
}

/// How an external port reference is resolved against its component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    Uses,
    Provides,
    /// The identifier names an interface the component object must support
    SupportedIdentifier,
}

/// Property promoted to the application's external surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalProperty {
    pub component: InstantiationId,
    pub property_id: String,
    pub external_id: Option<String>,
}

impl ExternalProperty {
    /// ID the property is exposed under on the application
    pub fn effective_id(&self) -> &str {
        self.external_id.as_deref().unwrap_or(&self.property_id)
    }
}
