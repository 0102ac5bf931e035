//! Run orchestrator
//!
//! Owns the Run/Task state machine: plan creation, the multi-pass step
//! execution loop, budget enforcement, approval suspension and resume, and
//! run termination. All collaborators (planner, step engine, approval gate,
//! ledger, selector) are injected at construction; nothing here reaches for
//! process-global state.

mod core;
mod process;

#[cfg(test)]
mod tests;

pub use self::core::{Orchestrator, OrchestratorConfig};

use uuid::Uuid;

/// Result of one pass through a run's execution loop.
///
/// `Suspended` is not terminal: the run parks in `waiting_approval` and a
/// later `respond_to_approval` resumes it. The other two variants terminate
/// the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Every planned step completed
    Completed,
    /// The run must terminate
    Failed {
        /// Maps onto `TerminationReason`
        reason: crate::types::TerminationReason,
        /// Human-readable detail
        details: String,
    },
    /// Execution parked on a pending human approval
    Suspended {
        /// The approval blocking progress
        approval_id: Uuid,
    },
}
