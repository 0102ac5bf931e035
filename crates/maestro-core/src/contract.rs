//! Contract enforcer collaborator boundary
//!
//! Validates that an agent's default action is allowlisted before dispatch
//! and that its required artifacts are present after execution. Both
//! failures are fatal for the step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{Error, Result};
use crate::types::{StepResult, TodoItem};

/// Declared contract for one agent type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContract {
    /// The agent's allowlisted default action
    pub default_action: String,
    /// Output keys (or artifact ids) the agent must produce
    pub required_artifacts: Vec<String>,
}

/// Validates agent actions and artifacts against declared allowlists
#[async_trait]
pub trait ContractEnforcer: Send + Sync {
    /// Check the agent's default action before dispatch
    async fn validate_action(&self, agent_type: &str) -> Result<()>;

    /// Check required artifacts after a successful execution
    async fn validate_artifacts(&self, step: &TodoItem, result: &StepResult) -> Result<()>;
}

/// Allowlist-backed enforcer.
///
/// An empty contract table is fully permissive. With contracts configured,
/// an unlisted agent type is still allowed (it declared nothing), but a
/// listed agent must declare an allowlisted default action and satisfy its
/// declared artifacts.
#[derive(Debug, Default)]
pub struct AllowlistEnforcer {
    contracts: HashMap<String, AgentContract>,
    /// Actions a contract may declare; empty means any
    allowed_actions: HashSet<String>,
    /// Reject agent types that have no declared contract
    strict: bool,
}

impl AllowlistEnforcer {
    /// Create a permissive enforcer with no contracts
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a contract for an agent type
    #[must_use]
    pub fn with_contract(mut self, agent_type: impl Into<String>, contract: AgentContract) -> Self {
        self.contracts.insert(agent_type.into(), contract);
        self
    }

    /// Restrict declared default actions to the given set
    #[must_use]
    pub fn allow_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Reject agent types without a declared contract
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

#[async_trait]
impl ContractEnforcer for AllowlistEnforcer {
    async fn validate_action(&self, agent_type: &str) -> Result<()> {
        let Some(contract) = self.contracts.get(agent_type) else {
            if self.strict {
                return Err(Error::ContractViolation(format!(
                    "agent type '{agent_type}' is not allowlisted"
                )));
            }
            return Ok(());
        };
        if !self.allowed_actions.is_empty()
            && !self.allowed_actions.contains(&contract.default_action)
        {
            return Err(Error::ContractViolation(format!(
                "agent type '{agent_type}' declares default action '{}' which is not allowlisted",
                contract.default_action
            )));
        }
        Ok(())
    }

    async fn validate_artifacts(&self, step: &TodoItem, result: &StepResult) -> Result<()> {
        let Some(contract) = self.contracts.get(&step.agent_type) else {
            return Ok(());
        };
        let StepResult::Success {
            outputs,
            artifact_ids,
            ..
        } = result
        else {
            return Ok(());
        };
        for required in &contract.required_artifacts {
            let present =
                outputs.contains_key(required) || artifact_ids.iter().any(|a| a == required);
            if !present {
                return Err(Error::ContractViolation(format!(
                    "step '{}' missing required artifact '{required}'",
                    step.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn success_with(keys: &[&str]) -> StepResult {
        StepResult::Success {
            outputs: keys
                .iter()
                .map(|k| ((*k).to_string(), serde_json::json!(true)))
                .collect::<Map<_, _>>(),
            artifact_ids: Vec::new(),
            tokens_used: 0,
            duration_ms: 0,
            model_used: None,
            workflow_error: None,
        }
    }

    #[tokio::test]
    async fn test_permissive_without_contracts() {
        let enforcer = AllowlistEnforcer::new();
        assert!(enforcer.validate_action("anything").await.is_ok());
    }

    #[tokio::test]
    async fn test_strict_rejects_unlisted_agent() {
        let enforcer = AllowlistEnforcer::new()
            .with_contract("coding", AgentContract::default())
            .strict();
        assert!(enforcer.validate_action("coding").await.is_ok());
        assert!(matches!(
            enforcer.validate_action("unknown").await,
            Err(Error::ContractViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_unlisted_default_action_is_violation() {
        let enforcer = AllowlistEnforcer::new()
            .with_contract(
                "coding",
                AgentContract {
                    default_action: "generate".to_string(),
                    required_artifacts: Vec::new(),
                },
            )
            .with_contract(
                "ops",
                AgentContract {
                    default_action: "shell".to_string(),
                    required_artifacts: Vec::new(),
                },
            )
            .allow_actions(["generate", "summarize"]);

        assert!(enforcer.validate_action("coding").await.is_ok());
        assert!(matches!(
            enforcer.validate_action("ops").await,
            Err(Error::ContractViolation(_))
        ));
        // an agent with no declared contract is unaffected by the action set
        assert!(enforcer.validate_action("research").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_artifact_is_violation() {
        let enforcer = AllowlistEnforcer::new().with_contract(
            "coding",
            AgentContract {
                default_action: "generate".to_string(),
                required_artifacts: vec!["diff".to_string()],
            },
        );
        let step = TodoItem::new("step-1", "write code", "coding");

        let ok = enforcer
            .validate_artifacts(&step, &success_with(&["diff"]))
            .await;
        assert!(ok.is_ok());

        let missing = enforcer
            .validate_artifacts(&step, &success_with(&["summary"]))
            .await;
        assert!(matches!(missing, Err(Error::ContractViolation(_))));
    }
}
