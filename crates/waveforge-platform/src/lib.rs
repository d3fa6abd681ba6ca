//! Waveforge Platform - Seams to the external collaborators
//!
//! The application factory orchestrates through interfaces, never concrete
//! services. This crate defines those interfaces:
//!
//! - **DomainView**: the device registry and domain-wide settings
//! - **AllocationManager**: capacity allocation against registered devices
//! - **RemoteDevice**: the per-device load/execute contract
//! - **NamingService**: the naming tree waveform contexts live in
//! - **ApplicationHandle / ApplicationBuilder**: the post-launch application
//!   object that receives components, wiring, and allocations
//! - **ConnectionManager**: endpoint resolution for declared connections
//!
//! ## In-Memory vs Production
//!
//! The crate ships in-memory implementations suitable for development and
//! testing. Production deployments back these traits with the real domain
//! infrastructure (CORBA naming, GPP devices, and so on) outside this
//! workspace.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod allocation;
pub mod application;
pub mod config;
pub mod connection;
pub mod device;
pub mod domain;
pub mod error;
pub mod memory;
pub mod naming;

// Re-exports
pub use allocation::{
    AllocationManager, AllocationRequest, AllocationResponse, DeploymentAllocation,
};
pub use application::{
    ApplicationBuilder, ApplicationCommit, ApplicationHandle, ApplicationInit, RemoteComponent,
};
pub use config::PlatformConfig;
pub use connection::{ConnectionManager, ConnectionRecord, EndpointResolver};
pub use device::{
    DeviceAssignmentRecord, DeviceNode, DeviceProfile, EndpointRef, RemoteDevice, UsageState,
};
pub use domain::DomainView;
pub use error::{ConfigureError, InitializeError, PlatformError, Result};
pub use memory::{
    FakeComponent, FakeExecutableDevice, FirstFitAllocationManager, InMemoryApplication,
    InMemoryApplicationBuilder, InMemoryDomain, InMemoryNamingService, ObjectTable,
    StubConnectionManager,
};
pub use naming::NamingService;
