//! In-memory implementations of the platform traits
//!
//! These are suitable for development and testing. Production deployments
//! back the same traits with the real domain infrastructure.
//!
//! The pieces cooperate the way the real ones do: the application builder
//! publishes each new application's registrar reference into an
//! [`ObjectTable`], and [`FakeExecutableDevice`] uses the
//! `NAMING_CONTEXT_IOR` exec parameter to find that registrar and register a
//! [`FakeComponent`] — the same round trip a launched process performs.

use crate::allocation::{
    AllocationManager, AllocationRequest, AllocationResponse, DeploymentAllocation,
};
use crate::application::{
    ApplicationBuilder, ApplicationCommit, ApplicationHandle, ApplicationInit, RemoteComponent,
};
use crate::config::PlatformConfig;
use crate::connection::{ConnectionManager, ConnectionRecord, EndpointResolver};
use crate::device::{DeviceNode, DeviceProfile, EndpointRef, RemoteDevice, UsageState};
use crate::domain::DomainView;
use crate::error::{ConfigureError, InitializeError, PlatformError, Result};
use crate::naming::NamingService;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};
use waveforge_types::{AllocationId, CodeType, ConnectionSpec, DeviceId, OsDep, Property};

/// Maps stringified object references back to live objects, standing in
/// for an ORB. The application builder registers each new application's
/// registrar here; fake devices resolve `NAMING_CONTEXT_IOR` against it.
#[derive(Default)]
pub struct ObjectTable {
    applications: DashMap<String, Arc<InMemoryApplication>>,
}

impl ObjectTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_application(&self, uri: String, application: Arc<InMemoryApplication>) {
        self.applications.insert(uri, application);
    }

    pub fn application(&self, uri: &str) -> Option<Arc<InMemoryApplication>> {
        self.applications.get(uri).map(|a| a.clone())
    }
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// In-memory domain manager view
pub struct InMemoryDomain {
    name: String,
    binding_timeout: Duration,
    file_manager_uri: String,
    devices: RwLock<Vec<DeviceNode>>,
    last_used: RwLock<Option<DeviceId>>,
    applications: RwLock<Vec<Arc<dyn ApplicationHandle>>>,
    properties: DashMap<String, Property>,
}

impl InMemoryDomain {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            file_manager_uri: format!("filemgr://{}", name),
            name,
            binding_timeout: Duration::from_secs(60),
            devices: RwLock::new(Vec::new()),
            last_used: RwLock::new(None),
            applications: RwLock::new(Vec::new()),
            properties: DashMap::new(),
        }
    }

    pub fn from_config(config: &PlatformConfig) -> Self {
        let mut domain = Self::new(config.domain_name.clone());
        domain.binding_timeout = Duration::from_secs(config.component_binding_timeout_secs);
        domain
    }

    /// Shorten the registration wait, for tests
    pub fn with_binding_timeout(mut self, timeout: Duration) -> Self {
        self.binding_timeout = timeout;
        self
    }

    pub async fn add_device(&self, node: DeviceNode) {
        self.devices.write().await.push(node);
    }

    pub fn set_property(&self, property: Property) {
        self.properties.insert(property.id.clone(), property);
    }

    pub async fn applications(&self) -> Vec<Arc<dyn ApplicationHandle>> {
        self.applications.read().await.clone()
    }
}

#[async_trait]
impl DomainView for InMemoryDomain {
    fn domain_name(&self) -> &str {
        &self.name
    }

    async fn registered_devices(&self) -> Result<Vec<DeviceNode>> {
        Ok(self.devices.read().await.clone())
    }

    async fn last_device_used(&self) -> Option<DeviceId> {
        self.last_used.read().await.clone()
    }

    async fn set_last_device_used(&self, device: DeviceId) {
        *self.last_used.write().await = Some(device);
    }

    fn component_binding_timeout(&self) -> Duration {
        self.binding_timeout
    }

    async fn add_application(&self, application: Arc<dyn ApplicationHandle>) -> Result<()> {
        self.applications.write().await.push(application);
        Ok(())
    }

    fn property(&self, id: &str) -> Option<Property> {
        self.properties.get(id).map(|p| p.clone())
    }

    fn file_manager_uri(&self) -> String {
        self.file_manager_uri.clone()
    }
}

// ---------------------------------------------------------------------------
// Naming service
// ---------------------------------------------------------------------------

enum Binding {
    Context,
    Object(EndpointRef),
}

/// In-memory naming tree keyed by slash-separated paths
#[derive(Default)]
pub struct InMemoryNamingService {
    bindings: DashMap<String, Binding>,
}

impl InMemoryNamingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an object under an existing context, the way a component binds
    /// itself after startup
    pub fn bind_object(&self, path: &str, reference: EndpointRef) {
        self.bindings
            .insert(path.to_string(), Binding::Object(reference));
    }

    pub fn context_exists(&self, path: &str) -> bool {
        matches!(
            self.bindings.get(path).as_deref(),
            Some(Binding::Context)
        )
    }

    /// Total bindings of any kind, for leak assertions in tests
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// The object bound at `path`, if any
    pub fn resolve_object(&self, path: &str) -> Option<EndpointRef> {
        match self.bindings.get(path).as_deref() {
            Some(Binding::Object(reference)) => Some(reference.clone()),
            _ => None,
        }
    }

    fn has_children(&self, path: &str) -> bool {
        let prefix = format!("{}/", path);
        self.bindings.iter().any(|e| e.key().starts_with(&prefix))
    }
}

#[async_trait]
impl NamingService for InMemoryNamingService {
    async fn is_bound(&self, path: &str) -> Result<bool> {
        Ok(self.bindings.contains_key(path))
    }

    async fn bind_new_context(&self, path: &str) -> Result<()> {
        if self.bindings.contains_key(path) {
            return Err(PlatformError::AlreadyBound(path.to_string()));
        }
        self.bindings.insert(path.to_string(), Binding::Context);
        Ok(())
    }

    async fn unbind(&self, path: &str) -> Result<()> {
        if self.bindings.remove(path).is_none() {
            return Err(PlatformError::Naming(format!("{} is not bound", path)));
        }
        Ok(())
    }

    async fn unbind_children(&self, path: &str) -> Result<()> {
        let prefix = format!("{}/", path);
        self.bindings.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    async fn destroy_context(&self, path: &str) -> Result<()> {
        if self.has_children(path) {
            return Err(PlatformError::Naming(format!("{} is not empty", path)));
        }
        if self.bindings.remove(path).is_none() {
            return Err(PlatformError::Naming(format!("{} is not bound", path)));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Allocation manager
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DeviceCapacity {
    /// Numeric capacities, decremented per allocation
    remaining: HashMap<String, f64>,
    /// Non-numeric properties matched by equality
    identity: HashMap<String, String>,
}

/// First-fit allocation manager with real capacity bookkeeping
///
/// Numeric request properties decrement a per-device capacity pool;
/// non-numeric properties must equal the device's declared value. Processor
/// and OS constraints intersect the device profile. Deallocation restores
/// capacities, so tests can assert allocation balance via [`outstanding`].
///
/// [`outstanding`]: FirstFitAllocationManager::outstanding
#[derive(Default)]
pub struct FirstFitAllocationManager {
    devices: Mutex<Vec<DeviceNode>>,
    capacities: Mutex<HashMap<DeviceId, DeviceCapacity>>,
    outstanding: Mutex<HashMap<AllocationId, Vec<(DeviceId, String, f64)>>>,
}

impl FirstFitAllocationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device with its capacity properties. Numeric values
    /// become decrementable capacity; everything else matches by equality.
    pub fn register_device(&self, node: DeviceNode, capacity: Vec<Property>) {
        let mut entry = DeviceCapacity::default();
        for prop in capacity {
            match numeric_value(&prop) {
                Some(amount) => {
                    entry.remaining.insert(prop.id, amount);
                }
                None => {
                    entry.identity.insert(prop.id, prop.value.to_string());
                }
            }
        }
        self.capacities
            .lock()
            .unwrap()
            .insert(node.identifier.clone(), entry);
        self.devices.lock().unwrap().push(node);
    }

    /// Number of allocations currently held
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().unwrap().len()
    }

    /// Remaining numeric capacity of a device property, for assertions
    pub fn remaining(&self, device: &DeviceId, property: &str) -> Option<f64> {
        self.capacities
            .lock()
            .unwrap()
            .get(device)
            .and_then(|c| c.remaining.get(property).copied())
    }

    fn matches_profile(
        device: &DeviceNode,
        processor_deps: &[String],
        os_deps: &[OsDep],
    ) -> bool {
        if !processor_deps.is_empty()
            && !processor_deps
                .iter()
                .any(|p| device.profile.processors.contains(p))
        {
            return false;
        }
        if !os_deps.is_empty() && !os_deps.iter().any(|o| device.profile.os.contains(o)) {
            return false;
        }
        true
    }

    /// Attempt the allocation on one device; on success the capacity is
    /// already committed and the deltas are returned for later restore.
    fn try_allocate_on(
        &self,
        device: &DeviceNode,
        properties: &[Property],
    ) -> Option<Vec<(DeviceId, String, f64)>> {
        let mut table = self.capacities.lock().unwrap();
        let entry = table.entry(device.identifier.clone()).or_default();

        let mut wanted: Vec<(String, f64)> = Vec::new();
        if !gather_demands(properties, entry, &mut wanted) {
            return None;
        }
        for (id, amount) in &wanted {
            if entry.remaining.get(id).copied().unwrap_or(0.0) < *amount {
                return None;
            }
        }

        let mut deltas = Vec::with_capacity(wanted.len());
        for (id, amount) in wanted {
            *entry.remaining.get_mut(&id).expect("capacity present") -= amount;
            deltas.push((device.identifier.clone(), id, amount));
        }
        Some(deltas)
    }

    fn grant(&self, deltas: Vec<(DeviceId, String, f64)>) -> AllocationId {
        let id = AllocationId::new(uuid::Uuid::new_v4().to_string());
        self.outstanding.lock().unwrap().insert(id.clone(), deltas);
        id
    }
}

/// Collect the numeric demands of a request, walking nested tables.
/// Returns `false` when an identity property does not match.
fn gather_demands(
    properties: &[Property],
    entry: &DeviceCapacity,
    wanted: &mut Vec<(String, f64)>,
) -> bool {
    for prop in properties {
        if let waveforge_types::PropertyValue::Table(members) = &prop.value {
            if !gather_demands(members, entry, wanted) {
                return false;
            }
            continue;
        }
        match numeric_value(prop) {
            Some(amount) => wanted.push((prop.id.clone(), amount)),
            None => {
                if entry.identity.get(&prop.id) != Some(&prop.value.to_string()) {
                    return false;
                }
            }
        }
    }
    true
}

fn numeric_value(prop: &Property) -> Option<f64> {
    prop.value
        .as_f64()
        .or_else(|| prop.value.as_str().and_then(|s| s.parse::<f64>().ok()))
}

#[async_trait]
impl AllocationManager for FirstFitAllocationManager {
    async fn allocate(&self, requests: Vec<AllocationRequest>) -> Result<Vec<AllocationResponse>> {
        let devices = self.devices.lock().unwrap().clone();
        let mut responses = Vec::new();
        for request in requests {
            for device in &devices {
                if !Self::matches_profile(device, &request.processor_deps, &request.os_deps) {
                    continue;
                }
                if let Some(deltas) = self.try_allocate_on(device, &request.properties) {
                    responses.push(AllocationResponse {
                        request_id: request.request_id.clone(),
                        allocation_id: self.grant(deltas),
                        device: device.clone(),
                    });
                    break;
                }
            }
        }
        Ok(responses)
    }

    async fn allocate_deployment(
        &self,
        _request_id: &str,
        properties: Vec<Property>,
        candidates: &[DeviceNode],
        processor_deps: &[String],
        os_deps: &[OsDep],
    ) -> Result<Option<DeploymentAllocation>> {
        for device in candidates {
            if !Self::matches_profile(device, processor_deps, os_deps) {
                continue;
            }
            if let Some(deltas) = self.try_allocate_on(device, &properties) {
                debug!(device = %device.identifier, "deployment allocation granted");
                return Ok(Some(DeploymentAllocation {
                    allocation_id: self.grant(deltas),
                    device: device.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn deallocate(&self, ids: &[AllocationId]) -> Result<()> {
        for id in ids {
            let deltas = self.outstanding.lock().unwrap().remove(id);
            if let Some(deltas) = deltas {
                let mut table = self.capacities.lock().unwrap();
                for (device, property, amount) in deltas {
                    if let Some(entry) = table.get_mut(&device) {
                        *entry.remaining.entry(property).or_insert(0.0) += amount;
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Bookkeeping the application keeps per announced component
#[derive(Debug, Clone, Default)]
pub struct ComponentRecord {
    pub spd_path: String,
    pub implementation: Option<String>,
    pub naming_context: Option<String>,
    pub device: Option<DeviceNode>,
    pub loaded_files: Vec<String>,
    pub pid: Option<i64>,
}

impl std::fmt::Debug for InMemoryApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryApplication")
            .field("identifier", &self.identifier)
            .field("name", &self.name)
            .field("profile", &self.profile)
            .field("waveform_context", &self.waveform_context)
            .field("base_context", &self.base_context)
            .field("trusted", &self.trusted)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// In-memory application handle
pub struct InMemoryApplication {
    identifier: String,
    name: String,
    profile: String,
    waveform_context: String,
    base_context: String,
    trusted: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    components: DashMap<String, ComponentRecord>,
    registered: DashMap<String, Arc<dyn RemoteComponent>>,
    registration_notify: Notify,
    external_ports: DashMap<String, EndpointRef>,
    external_properties: DashMap<String, (String, String)>,
    commit: Mutex<Option<ApplicationCommit>>,
    released: AtomicBool,
    terminated: AtomicBool,
    unloaded: AtomicBool,
    activations_cleaned: AtomicBool,
}

impl InMemoryApplication {
    pub fn new(init: ApplicationInit) -> Self {
        Self {
            identifier: init.identifier,
            name: init.name,
            profile: init.profile,
            waveform_context: init.waveform_context,
            base_context: init.base_context,
            trusted: init.trusted,
            created_at: chrono::Utc::now(),
            components: DashMap::new(),
            registered: DashMap::new(),
            registration_notify: Notify::new(),
            external_ports: DashMap::new(),
            external_properties: DashMap::new(),
            commit: Mutex::new(None),
            released: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            unloaded: AtomicBool::new(false),
            activations_cleaned: AtomicBool::new(false),
        }
    }

    /// Register a component, as the component itself would after startup
    pub fn register_component(&self, component: Arc<dyn RemoteComponent>) {
        info!(component = %component.identifier(), application = %self.identifier,
              "component registered");
        self.registered
            .insert(component.identifier().to_string(), component);
        self.registration_notify.notify_waiters();
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.created_at
    }

    pub fn waveform_context(&self) -> &str {
        &self.waveform_context
    }

    pub fn base_context(&self) -> &str {
        &self.base_context
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn component_record(&self, identifier: &str) -> Option<ComponentRecord> {
        self.components.get(identifier).map(|r| r.clone())
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn commit_record(&self) -> Option<ApplicationCommit> {
        self.commit.lock().unwrap().clone()
    }

    pub fn external_port(&self, name: &str) -> Option<EndpointRef> {
        self.external_ports.get(name).map(|p| p.clone())
    }

    pub fn external_property(&self, external_id: &str) -> Option<(String, String)> {
        self.external_properties
            .get(external_id)
            .map(|p| p.clone())
    }

    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn was_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::SeqCst)
    }

    pub fn activations_were_cleaned(&self) -> bool {
        self.activations_cleaned.load(Ordering::SeqCst)
    }

    fn record(&self, identifier: &str) -> dashmap::mapref::one::RefMut<'_, String, ComponentRecord> {
        self.components
            .entry(identifier.to_string())
            .or_default()
    }
}

#[async_trait]
impl ApplicationHandle for InMemoryApplication {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn registrar_uri(&self) -> String {
        format!("registrar://{}", self.identifier)
    }

    fn add_component(&self, identifier: &str, spd_path: &str) {
        self.record(identifier).spd_path = spd_path.to_string();
    }

    fn set_component_implementation(&self, identifier: &str, impl_id: &str) {
        self.record(identifier).implementation = Some(impl_id.to_string());
    }

    fn set_component_naming_context(&self, identifier: &str, lookup_name: &str) {
        self.record(identifier).naming_context = Some(lookup_name.to_string());
    }

    fn set_component_device(&self, identifier: &str, device: &DeviceNode) {
        self.record(identifier).device = Some(device.clone());
    }

    fn add_component_loaded_file(&self, identifier: &str, file: &str) {
        self.record(identifier).loaded_files.push(file.to_string());
    }

    fn set_component_pid(&self, identifier: &str, pid: i64) {
        self.record(identifier).pid = Some(pid);
    }

    async fn wait_for_components(&self, expected: &HashSet<String>, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.registration_notify.notified();
            if expected
                .iter()
                .all(|id| self.registered.contains_key(id))
            {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return expected
                    .iter()
                    .all(|id| self.registered.contains_key(id));
            }
        }
    }

    fn registered_component(&self, identifier: &str) -> Option<Arc<dyn RemoteComponent>> {
        self.registered.get(identifier).map(|c| c.clone())
    }

    fn add_external_port(&self, name: &str, port: EndpointRef) {
        self.external_ports.insert(name.to_string(), port);
    }

    fn add_external_property(&self, external_id: &str, property_id: &str, component: &str) {
        self.external_properties.insert(
            external_id.to_string(),
            (component.to_string(), property_id.to_string()),
        );
    }

    async fn commit(&self, commit: ApplicationCommit) -> Result<()> {
        *self.commit.lock().unwrap() = Some(commit);
        Ok(())
    }

    async fn release_components(&self) {
        self.registered.clear();
        self.released.store(true, Ordering::SeqCst);
    }

    async fn terminate_components(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    async fn unload_components(&self) {
        for entry in self.components.iter() {
            if let Some(device) = &entry.device {
                if !device.remote.alive() {
                    warn!(device = %device.identifier, "device unreachable during unload");
                    continue;
                }
                for file in &entry.loaded_files {
                    if let Err(err) = device.remote.unload(file).await {
                        warn!(file = %file, error = %err, "unload failed during cleanup");
                    }
                }
            }
        }
        self.unloaded.store(true, Ordering::SeqCst);
    }

    async fn cleanup_activations(&self) {
        self.activations_cleaned.store(true, Ordering::SeqCst);
    }
}

/// Builds [`InMemoryApplication`]s and publishes their registrars in the
/// shared [`ObjectTable`]
pub struct InMemoryApplicationBuilder {
    objects: Arc<ObjectTable>,
    built: Mutex<Vec<Arc<InMemoryApplication>>>,
}

impl InMemoryApplicationBuilder {
    pub fn new(objects: Arc<ObjectTable>) -> Self {
        Self {
            objects,
            built: Mutex::new(Vec::new()),
        }
    }

    /// The most recently built application, for post-mortem assertions
    pub fn last_built(&self) -> Option<Arc<InMemoryApplication>> {
        self.built.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ApplicationBuilder for InMemoryApplicationBuilder {
    async fn build(&self, init: ApplicationInit) -> Result<Arc<dyn ApplicationHandle>> {
        let application = Arc::new(InMemoryApplication::new(init));
        self.objects
            .register_application(application.registrar_uri(), application.clone());
        self.built.lock().unwrap().push(application.clone());
        Ok(application)
    }
}

// ---------------------------------------------------------------------------
// Connection manager
// ---------------------------------------------------------------------------

/// Connection manager that resolves both endpoints and records the result
#[derive(Default)]
pub struct StubConnectionManager;

impl StubConnectionManager {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionManager for StubConnectionManager {
    async fn resolve_connection(
        &self,
        connection: &ConnectionSpec,
        resolver: &dyn EndpointResolver,
    ) -> Result<ConnectionRecord> {
        let uses = resolver.resolve_endpoint(&connection.uses).await?;
        let provides = resolver.resolve_endpoint(&connection.provides).await?;
        Ok(ConnectionRecord {
            id: connection.id.clone(),
            uses,
            provides,
        })
    }
}

// ---------------------------------------------------------------------------
// Fake device and component
// ---------------------------------------------------------------------------

/// Scriptable executable device
///
/// On a successful `execute` it resolves the application registrar from the
/// `NAMING_CONTEXT_IOR` parameter and registers a [`FakeComponent`] under
/// the `COMPONENT_IDENTIFIER`, unless told to stay silent.
pub struct FakeExecutableDevice {
    identifier: DeviceId,
    label: String,
    objects: Arc<ObjectTable>,
    busy: AtomicBool,
    alive: AtomicBool,
    fail_execute: Mutex<HashSet<String>>,
    never_register: Mutex<HashSet<String>>,
    fail_initialize: Mutex<HashSet<String>>,
    invalid_configure: Mutex<HashSet<String>>,
    loads: Mutex<Vec<String>>,
    unloads: Mutex<Vec<String>>,
    executions: Mutex<Vec<(String, Vec<Property>)>>,
    components: Mutex<Vec<Arc<FakeComponent>>>,
    next_pid: AtomicI64,
}

impl FakeExecutableDevice {
    pub fn new(identifier: impl Into<String>, objects: Arc<ObjectTable>) -> Arc<Self> {
        let identifier = identifier.into();
        Arc::new(Self {
            label: identifier.clone(),
            identifier: DeviceId::new(identifier),
            objects,
            busy: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            fail_execute: Mutex::new(HashSet::new()),
            never_register: Mutex::new(HashSet::new()),
            fail_initialize: Mutex::new(HashSet::new()),
            invalid_configure: Mutex::new(HashSet::new()),
            loads: Mutex::new(Vec::new()),
            unloads: Mutex::new(Vec::new()),
            executions: Mutex::new(Vec::new()),
            components: Mutex::new(Vec::new()),
            next_pid: AtomicI64::new(1000),
        })
    }

    pub fn identifier(&self) -> &DeviceId {
        &self.identifier
    }

    /// Build the registry entry for this device
    pub fn node(device: &Arc<Self>, processors: Vec<String>, os: Vec<OsDep>) -> DeviceNode {
        DeviceNode {
            identifier: device.identifier.clone(),
            label: device.label.clone(),
            executable: true,
            profile: DeviceProfile::new(processors, os),
            remote: device.clone() as Arc<dyn RemoteDevice>,
        }
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    /// Make the device unreachable, as a crashed device would be
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Make `execute` return a negative pid for the given path
    pub fn fail_execute_path(&self, path: impl Into<String>) {
        self.fail_execute.lock().unwrap().insert(path.into());
    }

    /// Execute succeeds but the component never registers. Matches the
    /// full runtime identifier or its instantiation-id prefix.
    pub fn suppress_registration(&self, component: impl Into<String>) {
        self.never_register.lock().unwrap().insert(component.into());
    }

    fn registration_suppressed(&self, identifier: &str) -> bool {
        self.never_register.lock().unwrap().iter().any(|entry| {
            identifier == entry || identifier.starts_with(&format!("{}:", entry))
        })
    }

    /// Components launched here whose `initialize` should fail. Matches
    /// the full runtime identifier or its instantiation-id prefix.
    pub fn fail_initialize_for(&self, component: impl Into<String>) {
        self.fail_initialize.lock().unwrap().insert(component.into());
    }

    fn initialize_fails(&self, identifier: &str) -> bool {
        self.fail_initialize.lock().unwrap().iter().any(|entry| {
            identifier == entry || identifier.starts_with(&format!("{}:", entry))
        })
    }

    /// Property IDs every launched component rejects in `configure`
    pub fn reject_property(&self, property_id: impl Into<String>) {
        self.invalid_configure
            .lock()
            .unwrap()
            .insert(property_id.into());
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    pub fn unloads(&self) -> Vec<String> {
        self.unloads.lock().unwrap().clone()
    }

    pub fn executions(&self) -> Vec<(String, Vec<Property>)> {
        self.executions.lock().unwrap().clone()
    }

    /// Components launched on this device
    pub fn components(&self) -> Vec<Arc<FakeComponent>> {
        self.components.lock().unwrap().clone()
    }
}

fn string_parameter(parameters: &[Property], id: &str) -> Option<String> {
    parameters
        .iter()
        .find(|p| p.id == id)
        .and_then(|p| p.value.as_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl RemoteDevice for FakeExecutableDevice {
    async fn load(&self, _file_manager: &str, path: &str, _code_type: CodeType) -> Result<()> {
        self.loads.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn unload(&self, path: &str) -> Result<()> {
        self.unloads.lock().unwrap().push(path.to_string());
        Ok(())
    }

    async fn execute(
        &self,
        path: &str,
        _options: &[Property],
        parameters: &[Property],
    ) -> Result<i64> {
        self.executions
            .lock()
            .unwrap()
            .push((path.to_string(), parameters.to_vec()));

        if self.fail_execute.lock().unwrap().contains(path) {
            return Ok(-1);
        }

        let identifier = string_parameter(parameters, "COMPONENT_IDENTIFIER")
            .ok_or_else(|| PlatformError::Device {
                device: self.identifier.to_string(),
                operation: "execute".into(),
                message: "missing COMPONENT_IDENTIFIER".into(),
            })?;

        if !self.registration_suppressed(&identifier) {
            let registrar = string_parameter(parameters, "NAMING_CONTEXT_IOR");
            if let Some(application) =
                registrar.and_then(|uri| self.objects.application(&uri))
            {
                let component = Arc::new(FakeComponent::new(
                    identifier.clone(),
                    self.initialize_fails(&identifier),
                    self.invalid_configure.lock().unwrap().clone(),
                ));
                self.components.lock().unwrap().push(component.clone());
                application.register_component(component);
            }
        }

        Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }

    async fn usage_state(&self) -> UsageState {
        if self.busy.load(Ordering::SeqCst) {
            UsageState::Busy
        } else {
            UsageState::Idle
        }
    }

    async fn get_port(&self, identifier: &str) -> Result<EndpointRef> {
        Ok(EndpointRef::new(format!(
            "device://{}#{}",
            self.identifier, identifier
        )))
    }

    async fn supports_interface(&self, _repository_id: &str) -> bool {
        true
    }

    fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Component stub registered by [`FakeExecutableDevice::execute`]
pub struct FakeComponent {
    identifier: String,
    fail_initialize: bool,
    invalid_configure: HashSet<String>,
    initialized: AtomicBool,
    configured: Mutex<Vec<Vec<Property>>>,
    supported_interfaces: Mutex<Option<HashSet<String>>>,
    ports: Mutex<Option<HashSet<String>>>,
}

impl FakeComponent {
    pub fn new(
        identifier: String,
        fail_initialize: bool,
        invalid_configure: HashSet<String>,
    ) -> Self {
        Self {
            identifier,
            fail_initialize,
            invalid_configure,
            initialized: AtomicBool::new(false),
            configured: Mutex::new(Vec::new()),
            supported_interfaces: Mutex::new(None),
            ports: Mutex::new(None),
        }
    }

    pub fn was_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Property sets received through `configure`, in call order
    pub fn configure_history(&self) -> Vec<Vec<Property>> {
        self.configured.lock().unwrap().clone()
    }

    /// Restrict which interfaces the component claims to support;
    /// unrestricted components support everything
    pub fn limit_interfaces(&self, interfaces: impl IntoIterator<Item = String>) {
        *self.supported_interfaces.lock().unwrap() = Some(interfaces.into_iter().collect());
    }

    /// Restrict which ports resolve; unrestricted components resolve any
    pub fn limit_ports(&self, ports: impl IntoIterator<Item = String>) {
        *self.ports.lock().unwrap() = Some(ports.into_iter().collect());
    }
}

#[async_trait]
impl RemoteComponent for FakeComponent {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn initialize(&self) -> std::result::Result<(), InitializeError> {
        if self.fail_initialize {
            return Err(InitializeError::new(format!(
                "component {} refused to initialize",
                self.identifier
            )));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn configure(
        &self,
        properties: &[Property],
    ) -> std::result::Result<(), ConfigureError> {
        let invalid: Vec<Property> = properties
            .iter()
            .filter(|p| self.invalid_configure.contains(&p.id))
            .cloned()
            .collect();
        if !invalid.is_empty() {
            return Err(ConfigureError::InvalidConfiguration {
                message: format!("component {} rejected properties", self.identifier),
                invalid_properties: invalid,
            });
        }
        self.configured.lock().unwrap().push(properties.to_vec());
        Ok(())
    }

    async fn get_port(&self, identifier: &str) -> Result<EndpointRef> {
        let ports = self.ports.lock().unwrap();
        if let Some(known) = ports.as_ref() {
            if !known.contains(identifier) {
                return Err(PlatformError::UnknownPort {
                    owner: self.identifier.clone(),
                    port: identifier.to_string(),
                });
            }
        }
        Ok(EndpointRef::new(format!(
            "component://{}#{}",
            self.identifier, identifier
        )))
    }

    async fn supports_interface(&self, repository_id: &str) -> bool {
        match self.supported_interfaces.lock().unwrap().as_ref() {
            Some(known) => known.contains(repository_id),
            None => true,
        }
    }

    fn object_ref(&self) -> EndpointRef {
        EndpointRef::new(format!("component://{}", self.identifier))
    }
}
