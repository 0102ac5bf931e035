//! Core data model: Task, Step, Run, and termination records
//!
//! All entities round-trip through serde; the store persists them as JSON
//! aggregates. Status transitions are monotonic: steps advance
//! pending → in_progress → {completed, failed} and never revert, and a
//! terminated Run is immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

/// Status of a Task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Plan stored, execution not started
    Planning,
    /// Execution loop is running steps
    Executing,
    /// Suspended on a pending human approval
    ApprovalNeeded,
    /// All steps completed
    Completed,
    /// A step failed or an approval was rejected
    Failed,
}

impl TaskStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::ApprovalNeeded => "approval_needed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Status of a Run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Allocated, not yet executing
    Created,
    /// Execution loop is active
    Executing,
    /// Suspended on a pending human approval
    WaitingApproval,
    /// Terminal; a TerminationRecord exists
    Terminated,
}

impl RunStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Executing => "executing",
            Self::WaitingApproval => "waiting_approval",
            Self::Terminated => "terminated",
        }
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet dispatched
    Pending,
    /// Dispatched to the execution engine
    InProgress,
    /// Finished successfully (or approved by a human)
    Completed,
    /// Finished with an error
    Failed,
}

/// Why a Run terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Every planned step completed
    Completed,
    /// A step failed during execution
    AgentError,
    /// Invocation or token budget ran out
    BudgetExhausted,
    /// A human rejected a pending approval
    ApprovalRejected,
    /// Agent action or artifacts violated the declared contract
    ContractViolation,
}

impl TerminationReason {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::AgentError => "agent_error",
            Self::BudgetExhausted => "budget_exhausted",
            Self::ApprovalRejected => "approval_rejected",
            Self::ContractViolation => "contract_violation",
        }
    }
}

/// Outcome of one step execution.
///
/// A tagged union so callers can never observe an ambiguous
/// "success but no outputs" state.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepResult {
    /// The step produced outputs
    Success {
        /// Named outputs produced by the agent
        outputs: HashMap<String, serde_json::Value>,
        /// Ids of artifacts the step produced
        artifact_ids: Vec<String>,
        /// Tokens consumed by the step
        tokens_used: u32,
        /// Wall-clock duration in milliseconds
        duration_ms: u64,
        /// Model the step ran with
        model_used: Option<String>,
        /// Failure detail from the workflow engine when the direct
        /// fallback produced this result
        workflow_error: Option<String>,
    },
    /// The step did not produce a usable result
    Failure {
        /// Human-readable failure reason
        reason: String,
    },
}

impl StepResult {
    /// Whether this is a success result
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Tokens consumed, zero for failures
    #[must_use]
    pub fn tokens_used(&self) -> u32 {
        match self {
            Self::Success { tokens_used, .. } => *tokens_used,
            Self::Failure { .. } => 0,
        }
    }

    /// Artifact ids, empty for failures
    #[must_use]
    pub fn artifact_ids(&self) -> &[String] {
        match self {
            Self::Success { artifact_ids, .. } => artifact_ids,
            Self::Failure { .. } => &[],
        }
    }
}

/// One planned unit of agent work within a Task's plan
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TodoItem {
    /// Step id, unique within the Task (e.g. "step-1")
    pub id: String,
    /// What the step should accomplish
    pub description: String,
    /// Target agent type the step dispatches to
    pub agent_type: String,
    /// Step ids that must complete before this step runs
    pub depends_on: Vec<String>,
    /// Planner-assigned static approval gate
    pub require_approval: bool,
    /// Current status; only ever advances
    pub status: StepStatus,
    /// Execution result, set at most once
    pub result: Option<StepResult>,
    /// Failure detail when status is failed
    pub error: Option<String>,
}

impl TodoItem {
    /// Create a pending step
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>, agent_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            agent_type: agent_type.into(),
            depends_on: Vec::new(),
            require_approval: false,
            status: StepStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// Add a dependency on another step
    #[must_use]
    pub fn with_dependency(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }

    /// Mark the step as requiring human approval before it runs
    #[must_use]
    pub fn with_approval_required(mut self) -> Self {
        self.require_approval = true;
        self
    }
}

/// The durable representation of one user request plus its plan and
/// per-step results. Owned exclusively by the orchestrator; mutated only
/// through its update methods; never deleted, only terminal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Task id
    pub id: Uuid,
    /// Project the task belongs to
    pub project_id: String,
    /// Requesting user
    pub user_id: String,
    /// Original natural-language query
    pub query: String,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Ordered plan of steps
    pub todo_list: Vec<TodoItem>,
    /// Ids of completed steps, in completion order, no duplicates
    pub steps_completed: Vec<String>,
    /// Accumulated token count across all steps
    pub total_tokens: u64,
    /// Number of step dispatches so far (invocation budget input)
    pub total_invocations: u32,
    /// Planner-supplied plan summary
    pub plan_summary: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
    /// Aggregate version for optimistic concurrency
    #[serde(default)]
    pub version: i64,
}

impl Task {
    /// Create a new task in `planning` status
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        query: impl Into<String>,
        todo_list: Vec<TodoItem>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            user_id: user_id.into(),
            query: query.into(),
            status: TaskStatus::Planning,
            todo_list,
            steps_completed: Vec::new(),
            total_tokens: 0,
            total_invocations: 0,
            plan_summary: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Whether a step's dependencies all appear in the completed list
    #[must_use]
    pub fn dependencies_met(&self, step: &TodoItem) -> bool {
        step.depends_on
            .iter()
            .all(|dep| self.steps_completed.iter().any(|c| c == dep))
    }

    /// Whether a step id is in the completed list
    #[must_use]
    pub fn is_step_completed(&self, step_id: &str) -> bool {
        self.steps_completed.iter().any(|c| c == step_id)
    }

    /// Append a step id to the completed list, ignoring duplicates
    pub fn record_completed(&mut self, step_id: &str) {
        if !self.is_step_completed(step_id) {
            self.steps_completed.push(step_id.to_string());
        }
    }

    /// Mutable access to a step by id
    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut TodoItem> {
        self.todo_list.iter_mut().find(|s| s.id == step_id)
    }

    /// Whether every planned step is in the completed list
    #[must_use]
    pub fn all_steps_completed(&self) -> bool {
        self.todo_list
            .iter()
            .all(|s| self.is_step_completed(&s.id))
    }
}

/// One execution attempt of a Task (1:1 at creation)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Run {
    /// Run id
    pub id: Uuid,
    /// The Task this Run executes
    pub task_id: Uuid,
    /// Project the run belongs to
    pub project_id: String,
    /// Requesting user
    pub user_id: String,
    /// Lifecycle status; transitions are monotonic
    pub status: RunStatus,
    /// When execution first started
    pub started_at: Option<DateTime<Utc>>,
    /// When the run terminated
    pub terminated_at: Option<DateTime<Utc>>,
    /// Why the run terminated
    pub termination_reason: Option<TerminationReason>,
    /// Human-readable termination detail
    pub termination_details: Option<String>,
    /// Total tokens consumed across steps
    pub total_tokens: u64,
    /// Total execution duration in milliseconds
    pub total_duration_ms: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Run {
    /// Allocate a run for a task in `created` status
    #[must_use]
    pub fn new(task: &Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task.id,
            project_id: task.project_id.clone(),
            user_id: task.user_id.clone(),
            status: RunStatus::Created,
            started_at: None,
            terminated_at: None,
            termination_reason: None,
            termination_details: None,
            total_tokens: 0,
            total_duration_ms: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether the run reached its terminal state
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.status == RunStatus::Terminated
    }
}

/// Immutable audit artifact written exactly once when a Run terminates
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TerminationRecord {
    /// The terminated run
    pub run_id: Uuid,
    /// Why the run terminated
    pub reason: TerminationReason,
    /// Human-readable detail, safe to expose to the user
    pub details: String,
    /// Last step the run touched
    pub last_step_id: Option<String>,
    /// Agent type of the last step
    pub last_agent_type: Option<String>,
    /// Number of steps in the plan
    pub steps_planned: usize,
    /// Number of steps completed
    pub steps_completed: usize,
    /// Total tokens consumed
    pub total_tokens: u64,
    /// Total duration in milliseconds
    pub total_duration_ms: u64,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When the run ended
    pub ended_at: DateTime<Utc>,
}

/// A project grouping tasks and runs for a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Project {
    /// Project id
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Display name
    pub name: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Create a new project
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A reference document in a user's library
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LibraryEntry {
    /// Entry id
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Project the entry is filed under, if any
    pub project_id: Option<String>,
    /// Display title
    pub title: String,
    /// Free-form document body
    pub content: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LibraryEntry {
    /// Create a new library entry
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            project_id: None,
            title: title.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// File the entry under a project
    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_steps() -> Task {
        Task::new(
            "u1",
            "p1",
            "build a pipeline",
            vec![
                TodoItem::new("step-1", "research", "research"),
                TodoItem::new("step-2", "implement", "coding").with_dependency("step-1"),
            ],
        )
    }

    #[test]
    fn test_dependencies_met() {
        let mut task = task_with_steps();
        let step2 = task.todo_list[1].clone();
        assert!(!task.dependencies_met(&step2));

        task.record_completed("step-1");
        assert!(task.dependencies_met(&step2));
    }

    #[test]
    fn test_record_completed_ignores_duplicates() {
        let mut task = task_with_steps();
        task.record_completed("step-1");
        task.record_completed("step-1");
        assert_eq!(task.steps_completed, vec!["step-1".to_string()]);
        assert!(task.steps_completed.len() <= task.todo_list.len());
    }

    #[test]
    fn test_all_steps_completed() {
        let mut task = task_with_steps();
        assert!(!task.all_steps_completed());
        task.record_completed("step-1");
        task.record_completed("step-2");
        assert!(task.all_steps_completed());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RunStatus::WaitingApproval).unwrap(),
            "\"waiting_approval\""
        );
        assert_eq!(
            serde_json::to_string(&TerminationReason::BudgetExhausted).unwrap(),
            "\"budget_exhausted\""
        );
    }

    #[test]
    fn test_step_result_round_trip() {
        let result = StepResult::Success {
            outputs: HashMap::from([("summary".to_string(), serde_json::json!("done"))]),
            artifact_ids: vec!["a1".to_string()],
            tokens_used: 42,
            duration_ms: 100,
            model_used: Some("llama3.2".to_string()),
            workflow_error: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: StepResult = serde_json::from_str(&json).unwrap();
        assert!(back.is_success());
        assert_eq!(back.tokens_used(), 42);
        assert_eq!(back.artifact_ids(), ["a1".to_string()]);
    }
}
