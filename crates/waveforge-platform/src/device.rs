//! Device registry entries and the remote device contract

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use waveforge_types::{CodeType, DeviceId, OsDep, Property};

/// Transient usage state reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageState {
    Idle,
    Active,
    Busy,
}

/// The property descriptor subset used for matching soft-package
/// dependencies against a device
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Processor families the device provides
    pub processors: Vec<String>,

    /// Operating systems the device provides
    pub os: Vec<OsDep>,
}

impl DeviceProfile {
    pub fn new(processors: Vec<String>, os: Vec<OsDep>) -> Self {
        Self { processors, os }
    }
}

/// A registered device as seen by one deployment
///
/// The node is a snapshot: `identifier`, `label`, and `profile` are copied
/// out of the registry at the start of a deployment, while `remote` stays a
/// live handle to the device's load/execute interface.
#[derive(Clone)]
pub struct DeviceNode {
    pub identifier: DeviceId,
    pub label: String,
    /// Whether the device exposes both load and execute
    pub executable: bool,
    pub profile: DeviceProfile,
    pub remote: Arc<dyn RemoteDevice>,
}

impl fmt::Debug for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceNode")
            .field("identifier", &self.identifier)
            .field("label", &self.label)
            .field("executable", &self.executable)
            .finish_non_exhaustive()
    }
}

/// An opaque object reference: a port, a component object, or a device,
/// as registered on the application's external surface or wired into a
/// connection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointRef(String);

impl EndpointRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A component-to-device assignment made during placement
#[derive(Debug, Clone)]
pub struct DeviceAssignmentRecord {
    /// Runtime identifier of the component the assignment belongs to
    pub component: String,
    pub device: DeviceId,
    pub node: DeviceNode,
}

/// Load/execute interface of one remote device
#[async_trait]
pub trait RemoteDevice: Send + Sync {
    /// Load a code file onto the device through the domain file manager
    async fn load(&self, file_manager: &str, path: &str, code_type: CodeType) -> Result<()>;

    /// Unload a previously loaded file
    async fn unload(&self, path: &str) -> Result<()>;

    /// Launch an executable; a negative process ID signals failure without
    /// an exception
    async fn execute(
        &self,
        path: &str,
        options: &[Property],
        parameters: &[Property],
    ) -> Result<i64>;

    async fn usage_state(&self) -> UsageState;

    /// Resolve a port on the device object
    async fn get_port(&self, identifier: &str) -> Result<EndpointRef>;

    /// Whether the device object supports the given interface
    async fn supports_interface(&self, repository_id: &str) -> bool;

    /// Whether the remote object still exists; rollback checks this before
    /// best-effort unloads
    fn alive(&self) -> bool {
        true
    }
}
