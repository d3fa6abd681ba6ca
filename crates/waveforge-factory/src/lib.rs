//! Waveforge Factory - Application instantiation engine
//!
//! The factory turns one assembly descriptor into a running application:
//!
//! 1. pick a process-unique waveform naming context
//! 2. resolve each component to an implementation and a device, honoring
//!    caller assignments, host collocation groups, and usesdevice capacity
//!    dependencies
//! 3. load and execute component code on the assigned devices
//! 4. wait for components to register, initialize them, wire connections,
//!    and apply configuration
//! 5. publish the finished application — or roll every step back
//!
//! All remote interaction goes through the seams in `waveforge-platform`;
//! deployments running concurrently contend only on the allocation manager
//! and the waveform-context serial.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod allocations;
pub mod collocation;
pub mod combinator;
pub mod error;
pub mod external;
pub mod factory;
pub mod math;
pub mod placement;
pub mod softpkg;
pub mod transaction;
pub mod usesdevice;

// Re-exports
pub use allocations::ScopedAllocations;
pub use error::{CreateError, DeviceAssignment, ErrorCode, Result};
pub use factory::ApplicationFactory;
pub use transaction::{
    COMPONENT_IDENTIFIER, DOM_PATH, LOGGING_CONFIG_URI, NAME_BINDING, NAMING_CONTEXT_IOR,
    PROFILE_NAME, TRUSTED_APPLICATION,
};
