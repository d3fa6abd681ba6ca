//! Connection manager contract

use crate::device::EndpointRef;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waveforge_types::{ConnectionSpec, Endpoint};

/// A resolved, established connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub id: String,
    pub uses: EndpointRef,
    pub provides: EndpointRef,
}

/// Resolves descriptor endpoints against the deployment in progress.
///
/// Implemented by the factory's deploy transaction, which knows which
/// component registered where and which device satisfied each usesdevice.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    async fn resolve_endpoint(&self, endpoint: &Endpoint) -> Result<EndpointRef>;
}

/// Establishes connections between resolved endpoints
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    /// Resolve both sides of a connection and establish it. A resolution
    /// failure fails the whole deployment.
    async fn resolve_connection(
        &self,
        connection: &ConnectionSpec,
        resolver: &dyn EndpointResolver,
    ) -> Result<ConnectionRecord>;
}
