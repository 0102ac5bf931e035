use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::RiskLevel;
use crate::types::{StepResult, TodoItem};

/// Keywords that mark a step as high risk regardless of its result
const HIGH_RISK_KEYWORDS: &[&str] = &[
    "delete", "drop", "deploy", "production", "payment", "credential", "secret",
];

/// Artifact count above which a result is flagged for review
const ARTIFACT_REVIEW_THRESHOLD: usize = 5;

/// Risk assessment for one executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Assessed risk level
    pub level: RiskLevel,
    /// Contributing factors, human-readable
    pub factors: Vec<String>,
    /// The assessment can be waved through without a human
    pub auto_approvable: bool,
    /// A human decision is required
    pub required: bool,
}

impl RiskAssessment {
    /// A low-risk assessment requiring nothing
    #[must_use]
    pub fn low() -> Self {
        Self {
            level: RiskLevel::Low,
            factors: Vec::new(),
            auto_approvable: true,
            required: false,
        }
    }
}

/// Decides whether a step's result needs human sign-off
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Assess the risk of an executed step
    async fn assess(&self, step: &TodoItem, result: &StepResult) -> RiskAssessment;
}

/// Keyword and artifact-count based gate.
///
/// High-risk keywords in the step description require a human; a large
/// artifact set is flagged medium but auto-approvable.
#[derive(Debug, Default)]
pub struct HeuristicGate;

impl HeuristicGate {
    /// Create the default gate
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ApprovalGate for HeuristicGate {
    async fn assess(&self, step: &TodoItem, result: &StepResult) -> RiskAssessment {
        let lower = step.description.to_lowercase();
        let mut factors = Vec::new();

        for keyword in HIGH_RISK_KEYWORDS {
            if lower.contains(keyword) {
                factors.push(format!("description mentions '{keyword}'"));
            }
        }
        if !factors.is_empty() {
            return RiskAssessment {
                level: RiskLevel::High,
                factors,
                auto_approvable: false,
                required: true,
            };
        }

        let artifact_count = result.artifact_ids().len();
        if artifact_count > ARTIFACT_REVIEW_THRESHOLD {
            return RiskAssessment {
                level: RiskLevel::Medium,
                factors: vec![format!("step produced {artifact_count} artifacts")],
                auto_approvable: true,
                required: true,
            };
        }

        RiskAssessment::low()
    }
}
