//! Error types for maestro-core
//!
//! Realizes the orchestrator error taxonomy. A schema-validation failure on
//! a stored entity is deliberately not represented here: the store logs it
//! and reports the entity as absent instead of surfacing a corrupted object.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Agent not allowlisted or required artifacts missing; fatal for the step
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Invocation or token budget exhausted; terminates the Run
    #[error("budget exhausted: {0}")]
    BudgetExhausted(String),

    /// External workflow engine unreachable or reported failure; recoverable
    /// via the direct-execution fallback
    #[error("workflow engine unavailable: {0}")]
    WorkflowUnavailable(String),

    /// Direct agent executor failed; fatal for the step
    #[error("agent execution error: {0}")]
    AgentExecution(String),

    /// Planner collaborator failed; propagated, never swallowed
    #[error("planning error: {0}")]
    Planning(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Optimistic-concurrency conflict on an aggregate update
    #[error("conflicting update for {entity} {id}")]
    Conflict {
        /// Aggregate kind ("task", "run", ...)
        entity: &'static str,
        /// Aggregate id
        id: String,
    },

    /// Entity does not exist (or failed schema validation on read)
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Aggregate kind
        entity: &'static str,
        /// Aggregate id
        id: String,
    },

    /// Caller-supplied input rejected
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
