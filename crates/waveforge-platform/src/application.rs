//! Application handle contract
//!
//! The application object outlives `create` and owns everything the
//! deployment produced: component records, wiring, allocation IDs, used
//! devices. During `create` the factory feeds it incrementally; on failure
//! the handle is also the rollback surface for launched components.

use crate::connection::ConnectionRecord;
use crate::device::{DeviceAssignmentRecord, DeviceNode, EndpointRef};
use crate::error::{ConfigureError, InitializeError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use waveforge_types::{AllocationId, Property};

/// Constructor arguments for a new application handle
#[derive(Debug, Clone)]
pub struct ApplicationInit {
    /// Unique application identifier (`"{assemblyId}:{waveformContext}"`)
    pub identifier: String,

    /// User-supplied application name
    pub name: String,

    /// Software profile path of the assembly
    pub profile: String,

    /// Waveform context name chosen by the namer
    pub waveform_context: String,

    /// Full naming path of the waveform context
    pub base_context: String,

    /// Stripped from the init configuration before any component sees it
    pub trusted: bool,
}

/// Everything handed over when a deployment commits
#[derive(Debug, Clone)]
pub struct ApplicationCommit {
    /// Runtime identifier of the assembly controller, when one exists
    pub assembly_controller: Option<String>,

    /// Devices used by components and usesdevice allocations
    pub used_devices: Vec<DeviceAssignmentRecord>,

    /// Runtime identifiers in publish order
    pub start_sequence: Vec<String>,

    pub connections: Vec<ConnectionRecord>,

    /// Capacity allocations now owned by the application
    pub allocation_ids: Vec<AllocationId>,
}

/// Lifecycle interface of a registered component
#[async_trait]
pub trait RemoteComponent: Send + Sync {
    /// Runtime identifier the component registered under
    fn identifier(&self) -> &str;

    async fn initialize(&self) -> std::result::Result<(), InitializeError>;

    async fn configure(&self, properties: &[Property]) -> std::result::Result<(), ConfigureError>;

    async fn get_port(&self, identifier: &str) -> Result<EndpointRef>;

    async fn supports_interface(&self, repository_id: &str) -> bool;

    /// Reference to the component object itself
    fn object_ref(&self) -> EndpointRef;
}

/// The application object under construction
#[async_trait]
pub trait ApplicationHandle: Send + Sync + std::fmt::Debug {
    fn identifier(&self) -> &str;

    fn name(&self) -> &str;

    /// Reference components pass as `NAMING_CONTEXT_IOR` to find their
    /// registrar
    fn registrar_uri(&self) -> String;

    /// Announce a component the application should expect
    fn add_component(&self, identifier: &str, spd_path: &str);

    fn set_component_implementation(&self, identifier: &str, impl_id: &str);

    fn set_component_naming_context(&self, identifier: &str, lookup_name: &str);

    fn set_component_device(&self, identifier: &str, device: &DeviceNode);

    fn add_component_loaded_file(&self, identifier: &str, file: &str);

    fn set_component_pid(&self, identifier: &str, pid: i64);

    /// Block until every expected component has registered, bounded by
    /// `timeout`. Returns `false` on expiry.
    async fn wait_for_components(&self, expected: &HashSet<String>, timeout: Duration) -> bool;

    /// The registered component with the given runtime identifier
    fn registered_component(&self, identifier: &str) -> Option<Arc<dyn RemoteComponent>>;

    /// Register an external port under a globally unique name
    fn add_external_port(&self, name: &str, port: EndpointRef);

    /// Register an external property alias
    fn add_external_property(&self, external_id: &str, property_id: &str, component: &str);

    /// Final hand-off of the deployment's results
    async fn commit(&self, commit: ApplicationCommit) -> Result<()>;

    // Rollback surface, all best-effort:

    async fn release_components(&self);

    async fn terminate_components(&self);

    async fn unload_components(&self);

    async fn cleanup_activations(&self);
}

/// Builds application handles; injected so the factory never depends on a
/// concrete application implementation
#[async_trait]
pub trait ApplicationBuilder: Send + Sync {
    async fn build(&self, init: ApplicationInit) -> Result<Arc<dyn ApplicationHandle>>;
}
