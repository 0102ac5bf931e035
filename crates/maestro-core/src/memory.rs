//! Memory collaborator boundary
//!
//! The multi-tier conversational memory subsystem is external; the
//! orchestrator only ever sees an opaque context string built from recent
//! and long-term memory.

use async_trait::async_trait;

use crate::error::Result;

/// Supplies the execution context string for planning and step dispatch
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Build the context string for a user and query
    async fn context_for(&self, user_id: &str, query: &str) -> Result<String>;
}

/// Context provider that supplies no context
#[derive(Debug, Default)]
pub struct NoContext;

#[async_trait]
impl ContextProvider for NoContext {
    async fn context_for(&self, _user_id: &str, _query: &str) -> Result<String> {
        Ok(String::new())
    }
}
