//! Platform error types

use thiserror::Error;
use waveforge_types::Property;

/// Errors raised by platform collaborators
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("device {device} failed during {operation}: {message}")]
    Device {
        device: String,
        operation: String,
        message: String,
    },

    #[error("invalid file name: {0}")]
    InvalidFile(String),

    #[error("allocation manager failure: {0}")]
    Allocation(String),

    #[error("naming service failure: {0}")]
    Naming(String),

    #[error("name already bound: {0}")]
    AlreadyBound(String),

    #[error("unknown port {port} on {owner}")]
    UnknownPort { owner: String, port: String },

    #[error("application error: {0}")]
    Application(String),

    #[error("connection {id} could not be resolved: {reason}")]
    Connection { id: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Failure reported by a component's `initialize`
#[derive(Debug, Error)]
#[error("initialize failed: {}", messages.join("; "))]
pub struct InitializeError {
    pub messages: Vec<String>,
}

impl InitializeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }
}

/// Failure reported by a component's `configure`
#[derive(Debug, Error)]
pub enum ConfigureError {
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
        invalid_properties: Vec<Property>,
    },

    #[error("partial configuration; {} properties rejected", invalid_properties.len())]
    PartialConfiguration { invalid_properties: Vec<Property> },

    #[error("configure failed: {0}")]
    Other(String),
}

impl ConfigureError {
    /// The properties the component rejected, when it reported any
    pub fn invalid_properties(&self) -> &[Property] {
        match self {
            ConfigureError::InvalidConfiguration {
                invalid_properties, ..
            }
            | ConfigureError::PartialConfiguration { invalid_properties } => invalid_properties,
            ConfigureError::Other(_) => &[],
        }
    }
}
