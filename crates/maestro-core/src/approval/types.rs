use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Status of an approval request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Waiting for user decision
    Pending,
    /// User approved the step
    Approved,
    /// User rejected the step
    Rejected,
}

impl ApprovalStatus {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Which trigger point created the approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    /// Planner marked the step `require_approval`; the step has not run
    StaticGate,
    /// Risk assessment flagged the step's result after execution
    DynamicRisk,
}

/// Assessed risk level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Routine action
    Low,
    /// Worth a look
    Medium,
    /// Destructive or externally visible
    High,
}

/// Structured preview of what the gated step does or produced
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ApprovalPreview {
    /// Files the step touches
    pub files: Vec<String>,
    /// Commands the step runs
    pub commands: Vec<String>,
    /// Arbitrary structured detail
    pub detail: Option<serde_json::Value>,
}

/// A pending human decision gating one step.
///
/// Created exactly once per gated step; transitions
/// pending → {approved, rejected} exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Approval {
    /// Approval id
    pub id: Uuid,
    /// Run the approval suspends
    pub run_id: Uuid,
    /// Task the gated step belongs to
    pub task_id: Uuid,
    /// Project the task belongs to
    pub project_id: String,
    /// The gated step
    pub step_id: String,
    /// User who must respond
    pub user_id: String,
    /// Which trigger point created this approval
    pub approval_type: ApprovalType,
    /// What is being approved
    pub description: String,
    /// Assessed risk level
    pub risk_level: RiskLevel,
    /// Structured preview for the reviewer
    pub preview: ApprovalPreview,
    /// Current status
    pub status: ApprovalStatus,
    /// When the approval was created
    pub created_at: DateTime<Utc>,
    /// When the user responded
    pub responded_at: Option<DateTime<Utc>>,
    /// Optional reviewer notes
    pub notes: Option<String>,
}

impl Approval {
    /// Create a pending approval for a step
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        run_id: Uuid,
        task_id: Uuid,
        project_id: impl Into<String>,
        step_id: impl Into<String>,
        user_id: impl Into<String>,
        approval_type: ApprovalType,
        description: impl Into<String>,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            task_id,
            project_id: project_id.into(),
            step_id: step_id.into(),
            user_id: user_id.into(),
            approval_type,
            description: description.into(),
            risk_level,
            preview: ApprovalPreview::default(),
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
            responded_at: None,
            notes: None,
        }
    }

    /// Attach a structured preview
    #[must_use]
    pub fn with_preview(mut self, preview: ApprovalPreview) -> Self {
        self.preview = preview;
        self
    }

    /// Whether the approval is still awaiting a decision
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Apply the user's decision. Returns false if already resolved.
    pub fn resolve(&mut self, approved: bool, notes: Option<String>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };
        self.responded_at = Some(Utc::now());
        self.notes = notes;
        true
    }
}
