//! Strongly-typed identifiers for waveforge entities
//!
//! All IDs wrap plain strings from descriptor records or allocation
//! responses. `Display` prints the raw string: these values round-trip
//! through exec parameters and device assignment maps, so the wrapper must
//! never decorate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a component instantiation within an assembly descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstantiationId(String);

impl InstantiationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstantiationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstantiationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a registered device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identifier of a capacity allocation held on some device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllocationId(String);

impl AllocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_undecorated() {
        let id = DeviceId::new("gpp-0");
        assert_eq!(format!("{}", id), "gpp-0");
        assert_eq!(id.as_str(), "gpp-0");
    }

    #[test]
    fn ids_compare_by_content() {
        assert_eq!(InstantiationId::from("c1"), InstantiationId::new("c1"));
        assert_ne!(AllocationId::new("a"), AllocationId::new("b"));
    }
}
