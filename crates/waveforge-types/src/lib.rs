//! Waveforge Types - Core data model for waveform deployment
//!
//! A *waveform* is an application assembled from components that are placed
//! on, loaded onto, and executed by remote devices. This crate holds the
//! typed records that describe such an assembly:
//!
//! - **AssemblyDescriptor**: everything the descriptor loader yields for one
//!   waveform (components, collocations, connections, external surface)
//! - **ComponentSpec / ImplSpec**: a component instantiation and its
//!   candidate implementations, including soft-package dependencies
//! - **Property / PropertyValue / PropertyRef**: the typed property model
//!   shared by configuration, exec parameters, and allocation requests
//!
//! Placement state (`selected_implementation`, `assigned_device`) is carried
//! on the owned specs themselves; the deploy transaction owns the specs for
//! the duration of a `create` call.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod descriptor;
pub mod ids;
pub mod property;

// Re-export main types
pub use descriptor::{
    AssemblyDescriptor, CodeType, CollocationGroup, ComponentSpec, ConnectionSpec, Endpoint,
    ExternalPort, ExternalProperty, ImplSpec, OsDep, PortKind, SoftPkgDep, UsesDeviceSpec,
};
pub use ids::{AllocationId, DeviceId, InstantiationId};
pub use property::{Property, PropertyRef, PropertyValue};
