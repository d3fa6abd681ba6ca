//! Naming service contract
//!
//! Paths are slash-separated, rooted at the domain context
//! (`"DOMAIN_NAME/Waveform_3"`). The factory probes candidate context names,
//! binds the winner, and tears the subtree down on rollback.

use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait NamingService: Send + Sync {
    /// Whether anything resolves at `path`
    async fn is_bound(&self, path: &str) -> Result<bool>;

    /// Create and bind a new naming context at `path`; fails if the name
    /// is taken
    async fn bind_new_context(&self, path: &str) -> Result<()>;

    /// Remove the binding at `path`
    async fn unbind(&self, path: &str) -> Result<()>;

    /// Remove every binding below `path`, leaving the context itself
    async fn unbind_children(&self, path: &str) -> Result<()>;

    /// Destroy the context at `path`; the context must be empty
    async fn destroy_context(&self, path: &str) -> Result<()>;
}
