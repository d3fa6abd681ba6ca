//! Domain manager contract consumed by the factory

use crate::application::ApplicationHandle;
use crate::device::DeviceNode;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use waveforge_types::{DeviceId, Property};

/// The factory's view of the domain manager
#[async_trait]
pub trait DomainView: Send + Sync {
    fn domain_name(&self) -> &str;

    /// Snapshot of every registered device. Each deployment takes its own
    /// copy and mutates only that.
    async fn registered_devices(&self) -> Result<Vec<DeviceNode>>;

    /// Device used for the most recent deployment, if any
    async fn last_device_used(&self) -> Option<DeviceId>;

    async fn set_last_device_used(&self, device: DeviceId);

    /// How long to wait for components to register after execute
    fn component_binding_timeout(&self) -> Duration;

    /// Publish a finished application to the domain
    async fn add_application(&self, application: Arc<dyn ApplicationHandle>) -> Result<()>;

    /// Domain-wide property, e.g. the default `LOGGING_CONFIG_URI`
    fn property(&self, id: &str) -> Option<Property>;

    /// Reference to the domain file manager, passed to device `load` and
    /// appended to `sca:` logging URIs
    fn file_manager_uri(&self) -> String;
}
