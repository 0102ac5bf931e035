//! Planner collaborator boundary
//!
//! The natural-language planner that turns a query into an ordered step
//! list lives outside this crate. The orchestrator talks to it through the
//! `Planner` trait and propagates its failures unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One planned unit of work, before it becomes a `TodoItem`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    /// What the step should accomplish
    pub description: String,
    /// Target agent type
    pub agent_type: String,
    /// Zero-based indices of plan steps this one depends on
    pub depends_on: Vec<usize>,
    /// Whether the step must be approved by a human before it runs
    pub require_approval: bool,
}

impl PlannedStep {
    /// Create a plan step with no dependencies
    #[must_use]
    pub fn new(description: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            agent_type: agent_type.into(),
            depends_on: Vec::new(),
            require_approval: false,
        }
    }
}

/// An ordered execution plan for one query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// Ordered steps
    pub steps: Vec<PlannedStep>,
    /// Optional human-readable plan summary
    pub summary: Option<String>,
}

/// Converts a natural-language query into an ordered execution plan
#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce a plan for the query. `context` is the accumulated memory
    /// context string for the requesting user.
    async fn plan(&self, query: &str, context: &str) -> Result<Plan>;
}
