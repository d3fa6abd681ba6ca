//! Factory error types

use std::time::Duration;
use thiserror::Error;
use waveforge_platform::PlatformError;
use waveforge_types::{DeviceId, InstantiationId, Property};

/// A component-to-device pairing supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAssignment {
    pub component: InstantiationId,
    pub device: DeviceId,
}

/// Coarse error code carried alongside a create failure, for callers that
/// dispatch on category rather than message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No executable devices registered
    NoDevices,
    /// Capacity or dependency requirements could not be satisfied
    NoSpace,
    /// A remote operation failed or timed out
    Io,
    /// Invalid request or descriptor content
    InvalidArgument,
    /// A referenced file was unusable
    BadFile,
    /// Retrying may succeed
    TryAgain,
    /// Unclassified
    NotSet,
}

/// Errors raised by `create`
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("invalid assembly descriptor: {0}")]
    DescriptorInvalid(String),

    #[error("domain has no executable devices to run components")]
    NoExecutableDevices,

    #[error("insufficient capacity: {0}")]
    NoCapacity(String),

    /// Interface-level capacity error; placement failures carry the more
    /// specific `NoCapacity` message instead
    #[error("insufficient capacity to create the application")]
    InsufficientCapacity,

    #[error("device assignment names an unknown component or device")]
    BadAssignment { assignments: Vec<DeviceAssignment> },

    #[error("could not collocate components for group '{group}'")]
    CollocationFailed { group: String },

    #[error("property matching failed: {0}")]
    PropertyMatching(String),

    #[error("component '{component}' failed to execute")]
    ExecuteFailed { component: String },

    #[error(
        "timed out waiting for component '{component}' to register ({elapsed:?} elapsed)"
    )]
    RegistrationTimeout {
        component: String,
        elapsed: Duration,
    },

    #[error("initial configuration rejected; {} properties invalid", invalid_properties.len())]
    InvalidInitConfiguration { invalid_properties: Vec<Property> },

    #[error("remote operation failed: {0}")]
    RemoteFailure(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CreateError {
    /// Error category, mirroring the framework error numbers the original
    /// interface reported
    pub fn code(&self) -> ErrorCode {
        match self {
            CreateError::DescriptorInvalid(_) => ErrorCode::InvalidArgument,
            CreateError::NoExecutableDevices => ErrorCode::NoDevices,
            CreateError::NoCapacity(_)
            | CreateError::InsufficientCapacity
            | CreateError::CollocationFailed { .. } => ErrorCode::NoSpace,
            CreateError::BadAssignment { .. } => ErrorCode::InvalidArgument,
            CreateError::PropertyMatching(_) => ErrorCode::InvalidArgument,
            CreateError::ExecuteFailed { .. } => ErrorCode::TryAgain,
            CreateError::RegistrationTimeout { .. } => ErrorCode::Io,
            CreateError::InvalidInitConfiguration { .. } => ErrorCode::InvalidArgument,
            CreateError::RemoteFailure(_) => ErrorCode::Io,
            CreateError::Internal(_) => ErrorCode::NotSet,
        }
    }
}

impl From<PlatformError> for CreateError {
    fn from(err: PlatformError) -> Self {
        CreateError::RemoteFailure(err.to_string())
    }
}

/// Result type for factory operations
pub type Result<T> = std::result::Result<T, CreateError>;
