//! Application factory entry point
//!
//! One factory serves one validated assembly descriptor. Each `create`
//! call acquires a process-unique waveform naming context and hands the
//! rest of the work to a [`DeployTransaction`].

use crate::error::{DeviceAssignment, Result};
use crate::external::validate_external_names;
use crate::transaction::DeployTransaction;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, trace};
use waveforge_platform::{
    AllocationManager, ApplicationBuilder, ApplicationHandle, ConnectionManager, DomainView,
    NamingService,
};
use waveforge_types::{AssemblyDescriptor, Property};

/// Serializes waveform-context acquisition across every in-process
/// `create`. The guarded value is the waveform serial counter: holding the
/// lock across bump, probe, and bind guarantees two concurrent creates
/// never observe the same candidate name.
static PENDING_CREATE_LOCK: Mutex<u64> = Mutex::const_new(0);

/// Instantiates applications from one assembly descriptor
pub struct ApplicationFactory {
    descriptor: AssemblyDescriptor,
    domain: Arc<dyn DomainView>,
    allocator: Arc<dyn AllocationManager>,
    naming: Arc<dyn NamingService>,
    connection_manager: Arc<dyn ConnectionManager>,
    builder: Arc<dyn ApplicationBuilder>,
}

impl ApplicationFactory {
    /// Build a factory for `descriptor`, validating its external surface
    /// up front: duplicate external port or property names and
    /// assembly-controller property collisions are rejected here, not at
    /// `create` time.
    pub fn new(
        descriptor: AssemblyDescriptor,
        domain: Arc<dyn DomainView>,
        allocator: Arc<dyn AllocationManager>,
        naming: Arc<dyn NamingService>,
        connection_manager: Arc<dyn ConnectionManager>,
        builder: Arc<dyn ApplicationBuilder>,
    ) -> Result<Self> {
        validate_external_names(&descriptor)?;
        Ok(Self {
            descriptor,
            domain,
            allocator,
            naming,
            connection_manager,
            builder,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn identifier(&self) -> &str {
        &self.descriptor.id
    }

    /// Create an application instance.
    ///
    /// Components are assigned first from `device_assignments`, then by
    /// collocation groups, then by free placement; the assembled
    /// application is published to the domain only if every phase
    /// succeeds. Any failure rolls back allocations, loads, executions,
    /// and the waveform naming context.
    #[instrument(skip(self, init_configuration, device_assignments), fields(descriptor = %self.descriptor.id))]
    pub async fn create(
        &self,
        name: &str,
        init_configuration: Vec<Property>,
        device_assignments: Vec<DeviceAssignment>,
    ) -> Result<Arc<dyn ApplicationHandle>> {
        info!(name, "creating application");

        let (waveform_context, base_context) = self.establish_waveform_context(name).await?;

        let transaction = DeployTransaction::new(
            self.domain.clone(),
            self.allocator.clone(),
            self.naming.clone(),
            self.connection_manager.clone(),
            self.builder.clone(),
            self.descriptor.clone(),
            waveform_context,
            base_context,
        );
        transaction
            .run(name, init_configuration, &device_assignments)
            .await
    }

    /// Pick the next free `"{name}_{serial}"` context and bind it under
    /// the domain context. Context-creation failure is a hard error.
    async fn establish_waveform_context(&self, name: &str) -> Result<(String, String)> {
        let mut serial = PENDING_CREATE_LOCK.lock().await;
        loop {
            *serial = serial.wrapping_add(1);
            if *serial == 0 {
                *serial = 1;
            }
            let context = format!("{}_{}", name, *serial);
            let base = format!("{}/{}", self.domain.domain_name(), context);

            if self.naming.is_bound(&base).await? {
                continue;
            }

            trace!(context = %context, "binding new waveform context");
            match self.naming.bind_new_context(&base).await {
                Ok(()) => return Ok((context, base)),
                Err(err) => {
                    // In case the bind partially landed, unbind before
                    // surfacing the failure
                    error!(error = %err, context = %context, "binding the waveform context failed");
                    let _ = self.naming.unbind(&base).await;
                    return Err(err.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CreateError;
    use crate::transaction::{
        COMPONENT_IDENTIFIER, DOM_PATH, LOGGING_CONFIG_URI, NAME_BINDING, NAMING_CONTEXT_IOR,
        PROFILE_NAME, TRUSTED_APPLICATION,
    };
    use std::time::Duration;
    use waveforge_platform::{
        FakeExecutableDevice, FirstFitAllocationManager, InMemoryApplicationBuilder,
        InMemoryDomain, InMemoryNamingService, ObjectTable, StubConnectionManager,
    };
    use waveforge_types::{
        CollocationGroup, ComponentSpec, ConnectionSpec, DeviceId, Endpoint, ExternalPort,
        ExternalProperty, ImplSpec, InstantiationId, OsDep, PortKind, Property, PropertyRef,
        PropertyValue, UsesDeviceSpec,
    };

    struct Fixture {
        objects: Arc<ObjectTable>,
        domain: Arc<InMemoryDomain>,
        allocator: Arc<FirstFitAllocationManager>,
        naming: Arc<InMemoryNamingService>,
        builder: Arc<InMemoryApplicationBuilder>,
        devices: Vec<Arc<FakeExecutableDevice>>,
    }

    impl Fixture {
        /// A domain with one x86_64/Linux-3 GPP per identifier, each with
        /// a large memory capacity pool
        async fn new(device_ids: &[&str]) -> Self {
            let mut fixture = Self::empty().await;
            for id in device_ids {
                fixture
                    .add_device(id, &["x86_64"], &[("Linux", "3")], 1_000_000)
                    .await;
            }
            fixture
        }

        fn init_tracing() {
            use tracing_subscriber::EnvFilter;
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }

        async fn empty() -> Self {
            Self::init_tracing();
            let objects = ObjectTable::new();
            let domain = Arc::new(
                InMemoryDomain::new("WF_DOM").with_binding_timeout(Duration::from_secs(2)),
            );
            domain.set_property(Property::new(
                LOGGING_CONFIG_URI,
                PropertyValue::Str("file:///var/log/waveforge.properties".to_string()),
            ));
            Self {
                domain,
                allocator: Arc::new(FirstFitAllocationManager::new()),
                naming: Arc::new(InMemoryNamingService::new()),
                builder: Arc::new(InMemoryApplicationBuilder::new(objects.clone())),
                devices: Vec::new(),
                objects,
            }
        }

        async fn add_device(
            &mut self,
            id: &str,
            processors: &[&str],
            os: &[(&str, &str)],
            mem_capacity: i64,
        ) -> Arc<FakeExecutableDevice> {
            let device = FakeExecutableDevice::new(id, self.objects.clone());
            let node = FakeExecutableDevice::node(
                &device,
                processors.iter().map(|p| p.to_string()).collect(),
                os.iter().map(|(n, v)| OsDep::new(*n, *v)).collect(),
            );
            self.allocator.register_device(
                node.clone(),
                vec![Property::new(
                    "memCapacity",
                    PropertyValue::LongLong(mem_capacity),
                )],
            );
            self.domain.add_device(node).await;
            self.devices.push(device.clone());
            device
        }

        fn factory(&self, descriptor: AssemblyDescriptor) -> ApplicationFactory {
            ApplicationFactory::new(
                descriptor,
                self.domain.clone(),
                self.allocator.clone(),
                self.naming.clone(),
                Arc::new(StubConnectionManager::new()),
                self.builder.clone(),
            )
            .expect("descriptor should validate")
        }

        fn device(&self, id: &str) -> &Arc<FakeExecutableDevice> {
            self.devices
                .iter()
                .find(|d| d.identifier().as_str() == id)
                .expect("device exists")
        }
    }

    fn exec_impl(id: &str, processors: &[&str], os: &[(&str, &str)]) -> ImplSpec {
        let mut implementation = ImplSpec::new(id, format!("cpp/{}", id));
        implementation.entry_point = Some(format!("cpp/{}", id));
        implementation.processor_deps = processors.iter().map(|p| p.to_string()).collect();
        implementation.os_deps = os.iter().map(|(n, v)| OsDep::new(*n, *v)).collect();
        implementation.dependency_properties = vec![PropertyRef::Simple {
            id: "memCapacity".to_string(),
            value: "1000".to_string(),
        }];
        implementation
    }

    fn component(id: &str) -> ComponentSpec {
        let mut spec = ComponentSpec::with_id(id, format!("/components/{}/{}.spd.xml", id, id));
        spec.implementations
            .push(exec_impl(&format!("{}_impl", id), &["x86_64"], &[("Linux", "3")]));
        spec
    }

    fn descriptor(components: Vec<ComponentSpec>) -> AssemblyDescriptor {
        let mut descriptor = AssemblyDescriptor::new("sad-1", "wave");
        descriptor.components = components;
        descriptor
    }

    fn code_path(id: &str) -> String {
        format!("/components/{}/cpp/{}_impl", id, id)
    }

    #[tokio::test]
    async fn happy_path_on_a_single_device() {
        let fixture = Fixture::new(&["gpp-0"]).await;
        let factory = fixture.factory(descriptor(vec![component("c1")]));

        let application = factory
            .create("wave", Vec::new(), Vec::new())
            .await
            .expect("create should succeed");

        assert!(application.identifier().starts_with("sad-1:wave_"));

        // Exactly the six reserved exec parameters reached execute
        let executions = fixture.device("gpp-0").executions();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].0, code_path("c1"));
        let mut ids: Vec<&str> = executions[0].1.iter().map(|p| p.id.as_str()).collect();
        ids.sort_unstable();
        let mut expected = vec![
            NAMING_CONTEXT_IOR,
            COMPONENT_IDENTIFIER,
            NAME_BINDING,
            DOM_PATH,
            PROFILE_NAME,
            LOGGING_CONFIG_URI,
        ];
        expected.sort_unstable();
        assert_eq!(ids, expected);

        // The allocation now belongs to the application
        let built = fixture.builder.last_built().unwrap();
        let commit = built.commit_record().expect("application committed");
        assert_eq!(commit.allocation_ids.len(), 1);
        assert_eq!(fixture.allocator.outstanding(), 1);
        assert_eq!(built.component_count(), 1);

        assert_eq!(
            fixture.domain.last_device_used().await,
            Some(DeviceId::new("gpp-0"))
        );
        assert!(fixture.naming.context_exists(built.base_context()));
        assert_eq!(fixture.domain.applications().await.len(), 1);
    }

    #[tokio::test]
    async fn logging_config_uri_defaults_from_the_domain() {
        let fixture = Fixture::new(&["gpp-0"]).await;
        fixture.domain.set_property(Property::new(
            LOGGING_CONFIG_URI,
            PropertyValue::Str("sca:///logging.properties".to_string()),
        ));
        let factory = fixture.factory(descriptor(vec![component("c1")]));

        factory.create("wave", Vec::new(), Vec::new()).await.unwrap();

        let executions = fixture.device("gpp-0").executions();
        let uri = executions[0]
            .1
            .iter()
            .find(|p| p.id == LOGGING_CONFIG_URI)
            .and_then(|p| p.value.as_str())
            .unwrap()
            .to_string();
        assert!(uri.starts_with("sca:///logging.properties?fs="));
    }

    #[tokio::test]
    async fn collocated_components_share_one_device() {
        let mut fixture = Fixture::empty().await;
        fixture
            .add_device("gpp-0", &["armv8"], &[("Linux", "3")], 1_000_000)
            .await;
        fixture
            .add_device("gpp-1", &["x86_64"], &[("Linux", "3")], 1_000_000)
            .await;

        // Only (a1, b2) shares a processor family
        let mut c1 = ComponentSpec::with_id("c1", "/components/c1/c1.spd.xml");
        c1.implementations = vec![
            exec_impl("a1", &["x86_64"], &[("Linux", "3")]),
            exec_impl("a2", &["ppc64"], &[("Linux", "3")]),
        ];
        let mut c2 = ComponentSpec::with_id("c2", "/components/c2/c2.spd.xml");
        c2.implementations = vec![
            exec_impl("b1", &["ppc64"], &[("Linux", "3")]),
            exec_impl("b2", &["x86_64"], &[("Linux", "3")]),
        ];

        let mut assembly = descriptor(vec![c1, c2]);
        assembly.collocations.push(CollocationGroup {
            id: "col_1".to_string(),
            name: "pair".to_string(),
            components: vec![InstantiationId::from("c1"), InstantiationId::from("c2")],
        });

        let factory = fixture.factory(assembly);
        factory.create("wave", Vec::new(), Vec::new()).await.unwrap();

        let built = fixture.builder.last_built().unwrap();
        let commit = built.commit_record().unwrap();
        assert_eq!(commit.used_devices.len(), 2);
        assert!(commit
            .used_devices
            .iter()
            .all(|record| record.device == DeviceId::new("gpp-1")));

        // Both members executed on the shared device, none on the other
        assert_eq!(fixture.device("gpp-1").executions().len(), 2);
        assert!(fixture.device("gpp-0").executions().is_empty());
    }

    #[tokio::test]
    async fn bad_device_assignment_is_reported_with_the_offending_pair() {
        let fixture = Fixture::new(&["gpp-0"]).await;
        let factory = fixture.factory(descriptor(vec![component("c1")]));

        let err = factory
            .create(
                "wave",
                Vec::new(),
                vec![DeviceAssignment {
                    component: InstantiationId::from("c1"),
                    device: DeviceId::new("nonexistent"),
                }],
            )
            .await
            .unwrap_err();

        match err {
            CreateError::BadAssignment { assignments } => {
                assert_eq!(assignments.len(), 1);
                assert_eq!(assignments[0].component, InstantiationId::from("c1"));
                assert_eq!(assignments[0].device, DeviceId::new("nonexistent"));
            }
            other => panic!("expected BadAssignment, got {:?}", other),
        }

        assert_eq!(fixture.allocator.outstanding(), 0);
        assert_eq!(fixture.naming.binding_count(), 0);
        assert!(fixture.domain.applications().await.is_empty());
    }

    #[tokio::test]
    async fn execute_failure_rolls_back_loads_and_allocations() {
        let fixture = Fixture::new(&["gpp-0"]).await;
        fixture.device("gpp-0").fail_execute_path(code_path("c2"));

        let factory = fixture.factory(descriptor(vec![component("c1"), component("c2")]));
        let err = factory
            .create("wave", Vec::new(), Vec::new())
            .await
            .unwrap_err();

        match &err {
            CreateError::ExecuteFailed { component } => {
                assert!(component.starts_with("c2:"))
            }
            other => panic!("expected ExecuteFailed, got {:?}", other),
        }

        // The first component's load was undone along with everything else
        let unloads = fixture.device("gpp-0").unloads();
        assert!(unloads.contains(&code_path("c1")));
        assert!(unloads.contains(&code_path("c2")));

        let built = fixture.builder.last_built().unwrap();
        assert!(built.was_released());
        assert!(built.was_unloaded());
        assert!(built.commit_record().is_none());

        assert_eq!(fixture.allocator.outstanding(), 0);
        assert_eq!(fixture.naming.binding_count(), 0);
        assert!(fixture.domain.applications().await.is_empty());
    }

    #[tokio::test]
    async fn registration_timeout_names_the_silent_component() {
        let mut fixture = Fixture::empty().await;
        fixture.domain = Arc::new(
            InMemoryDomain::new("WF_DOM").with_binding_timeout(Duration::from_millis(50)),
        );
        fixture
            .add_device("gpp-0", &["x86_64"], &[("Linux", "3")], 1_000_000)
            .await;
        fixture.device("gpp-0").suppress_registration("c2");

        let factory = fixture.factory(descriptor(vec![component("c1"), component("c2")]));
        let err = factory
            .create("wave", Vec::new(), Vec::new())
            .await
            .unwrap_err();

        match &err {
            CreateError::RegistrationTimeout { component, .. } => {
                assert!(component.starts_with("c2:"))
            }
            other => panic!("expected RegistrationTimeout, got {:?}", other),
        }

        assert_eq!(fixture.allocator.outstanding(), 0);
        assert_eq!(fixture.naming.binding_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_contexts() {
        let fixture = Fixture::new(&["gpp-0", "gpp-1"]).await;
        let factory = Arc::new(fixture.factory(descriptor(vec![component("c1")])));

        let (first, second) = tokio::join!(
            factory.create("wave", Vec::new(), Vec::new()),
            factory.create("wave", Vec::new(), Vec::new()),
        );
        let first = first.unwrap();
        let second = second.unwrap();

        assert_ne!(first.identifier(), second.identifier());
        assert_eq!(fixture.domain.applications().await.len(), 2);
    }

    #[tokio::test]
    async fn start_sequence_is_ordered_and_excludes_the_controller() {
        let fixture = Fixture::new(&["gpp-0"]).await;

        let mut controller = component("ac");
        controller.start_order = Some(0);
        let mut second = component("c_second");
        second.start_order = Some(7);
        let mut first = component("c_first");
        first.start_order = Some(3);

        let mut assembly = descriptor(vec![controller, second, first]);
        assembly.assembly_controller = Some(InstantiationId::from("ac"));

        let factory = fixture.factory(assembly);
        factory.create("wave", Vec::new(), Vec::new()).await.unwrap();

        let commit = fixture.builder.last_built().unwrap().commit_record().unwrap();
        let sequence: Vec<&str> = commit
            .start_sequence
            .iter()
            .map(|id| id.split(':').next().unwrap())
            .collect();
        assert_eq!(sequence, vec!["c_first", "c_second"]);
        assert!(commit
            .assembly_controller
            .as_deref()
            .unwrap()
            .starts_with("ac:"));
    }

    #[tokio::test]
    async fn external_surface_is_published_and_overridable() {
        let fixture = Fixture::new(&["gpp-0"]).await;

        let mut c1 = component("c1");
        c1.configure_properties
            .push(Property::new("gain", PropertyValue::Double(1.0)));

        let mut assembly = descriptor(vec![c1]);
        assembly.external_ports.push(ExternalPort {
            component: InstantiationId::from("c1"),
            identifier: "out".to_string(),
            external_name: Some("wave_out".to_string()),
            kind: PortKind::Uses,
        });
        assembly.external_properties.push(ExternalProperty {
            component: InstantiationId::from("c1"),
            property_id: "gain".to_string(),
            external_id: Some("wave_gain".to_string()),
        });

        let factory = fixture.factory(assembly);
        factory
            .create(
                "wave",
                vec![Property::new("wave_gain", PropertyValue::Double(5.0))],
                Vec::new(),
            )
            .await
            .unwrap();

        let built = fixture.builder.last_built().unwrap();
        assert!(built.external_port("wave_out").is_some());
        let (owner, property_id) = built.external_property("wave_gain").unwrap();
        assert!(owner.starts_with("c1:"));
        assert_eq!(property_id, "gain");

        // The override flowed through to the component's configure call
        let components = fixture.device("gpp-0").components();
        let history = components[0].configure_history();
        assert_eq!(history.len(), 1);
        assert!(history[0]
            .iter()
            .any(|p| p.id == "gain" && p.value == PropertyValue::Double(5.0)));
    }

    #[tokio::test]
    async fn invalid_configure_maps_to_invalid_init_configuration() {
        let fixture = Fixture::new(&["gpp-0"]).await;
        fixture.device("gpp-0").reject_property("gain");

        let mut c1 = component("c1");
        c1.configure_properties
            .push(Property::new("gain", PropertyValue::Double(1.0)));

        let factory = fixture.factory(descriptor(vec![c1]));
        let err = factory
            .create("wave", Vec::new(), Vec::new())
            .await
            .unwrap_err();

        match err {
            CreateError::InvalidInitConfiguration { invalid_properties } => {
                assert_eq!(invalid_properties.len(), 1);
                assert_eq!(invalid_properties[0].id, "gain");
            }
            other => panic!("expected InvalidInitConfiguration, got {:?}", other),
        }
        assert_eq!(fixture.allocator.outstanding(), 0);
    }

    #[tokio::test]
    async fn trusted_flag_is_stripped_and_forwarded() {
        let fixture = Fixture::new(&["gpp-0"]).await;
        let factory = fixture.factory(descriptor(vec![component("c1")]));

        factory
            .create(
                "wave",
                vec![Property::new(
                    TRUSTED_APPLICATION,
                    PropertyValue::Boolean(false),
                )],
                Vec::new(),
            )
            .await
            .unwrap();

        let built = fixture.builder.last_built().unwrap();
        assert!(!built.is_trusted());

        // The flag never reached the component
        let executions = fixture.device("gpp-0").executions();
        assert!(executions[0]
            .1
            .iter()
            .all(|p| p.id != TRUSTED_APPLICATION));
    }

    #[tokio::test]
    async fn usesdevice_math_flows_into_the_allocation_request() {
        let fixture = Fixture::new(&["gpp-0"]).await;

        let mut c1 = component("c1");
        c1.configure_properties
            .push(Property::new("sampleRate", PropertyValue::Long(1_500_000)));
        c1.uses_devices.push(UsesDeviceSpec::new(
            "uses_mem",
            vec![PropertyRef::Simple {
                id: "memCapacity".to_string(),
                value: "__MATH__(2,sampleRate,*)".to_string(),
            }],
        ));

        let factory = fixture.factory(descriptor(vec![c1]));
        // Device pool is 1_000_000; the rewritten request wants 3_000_000
        let err = factory
            .create("wave", Vec::new(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(&err, CreateError::NoCapacity(_)));
        assert!(err.to_string().contains("uses_mem"));
        assert_eq!(fixture.allocator.outstanding(), 0);
    }

    #[tokio::test]
    async fn connections_are_wired_in_reverse_declaration_order() {
        let fixture = Fixture::new(&["gpp-0"]).await;

        let mut assembly = descriptor(vec![component("c1"), component("c2")]);
        assembly.connections = vec![
            ConnectionSpec {
                id: "conn_1".to_string(),
                uses: Endpoint::ComponentPort {
                    component: InstantiationId::from("c1"),
                    port: "out".to_string(),
                },
                provides: Endpoint::ComponentPort {
                    component: InstantiationId::from("c2"),
                    port: "in".to_string(),
                },
            },
            ConnectionSpec {
                id: "conn_2".to_string(),
                uses: Endpoint::ComponentPort {
                    component: InstantiationId::from("c2"),
                    port: "out".to_string(),
                },
                provides: Endpoint::ComponentSupportedInterface {
                    component: InstantiationId::from("c1"),
                    interface: "IDL:CF/Resource:1.0".to_string(),
                },
            },
        ];

        let factory = fixture.factory(assembly);
        factory.create("wave", Vec::new(), Vec::new()).await.unwrap();

        let commit = fixture.builder.last_built().unwrap().commit_record().unwrap();
        let order: Vec<&str> = commit.connections.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["conn_2", "conn_1"]);
    }

    #[tokio::test]
    async fn device_affinity_packs_subsequent_components() {
        let fixture = Fixture::new(&["gpp-0", "gpp-1"]).await;
        let factory = fixture.factory(descriptor(vec![component("c1"), component("c2")]));

        factory.create("wave", Vec::new(), Vec::new()).await.unwrap();

        // First-fit would satisfy either device; the rotation heuristic
        // keeps both components on whichever device took the first one
        let on_first = fixture.device("gpp-0").executions().len();
        let on_second = fixture.device("gpp-1").executions().len();
        assert_eq!((on_first, on_second), (2, 0));
    }
}
