use serde::Serialize;
use uuid::Uuid;

use crate::approval::RiskLevel;
use crate::types::TerminationReason;

/// Events emitted during run execution.
///
/// These intentionally exclude step outputs and other payload data;
/// detailed results are fetched via the REST endpoints using the ids
/// carried here.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    /// A run was allocated for a task
    RunCreated {
        /// Run identifier
        run_id: Uuid,
        /// Task identifier
        task_id: Uuid,
        /// Requesting user
        user_id: String,
    },
    /// Run execution started
    RunStarted {
        /// Run identifier
        run_id: Uuid,
        /// Task identifier
        task_id: Uuid,
    },
    /// A step was dispatched
    StepStarted {
        /// Run identifier
        run_id: Uuid,
        /// Step id within the plan
        step_id: String,
        /// Target agent type
        agent_type: String,
        /// Model the step runs with
        model: String,
    },
    /// A step reached a terminal status
    StepCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Step id within the plan
        step_id: String,
        /// Whether the step succeeded
        success: bool,
        /// Tokens the step consumed
        tokens_used: u32,
        /// Step duration in milliseconds
        duration_ms: u64,
    },
    /// A human approval is required
    ApprovalRequested {
        /// Run identifier
        run_id: Uuid,
        /// Approval record id
        approval_id: Uuid,
        /// Step the approval gates
        step_id: String,
        /// Assessed risk level
        risk_level: RiskLevel,
    },
    /// A pending approval was answered
    ApprovalResolved {
        /// Approval record id
        approval_id: Uuid,
        /// Run identifier
        run_id: Uuid,
        /// Whether the user approved
        approved: bool,
    },
    /// A user's spend crossed the warning threshold
    BudgetWarning {
        /// User whose budget is running low
        user_id: String,
        /// Window that crossed ("daily" or "monthly")
        period: String,
        /// Spend after the crossing (USD)
        spent_usd: f64,
        /// The configured limit (USD)
        limit_usd: f64,
    },
    /// A run reached its terminal state
    RunTerminated {
        /// Run identifier
        run_id: Uuid,
        /// Task identifier
        task_id: Uuid,
        /// Why the run terminated
        reason: TerminationReason,
        /// Human-readable detail
        details: String,
    },
}
