//! Step Execution Engine
//!
//! Dispatches one ready step: contract pre-check, context build, workflow
//! engine attempt, direct-executor fallback on workflow failure, artifact
//! post-check. The fallback is strict two-tier — workflow then direct —
//! with no retry loop inside a single invocation; retries happen at the
//! Run level via the selector's fallback chain on a later submission.

mod registry;
mod workflow;


pub use registry::{AgentExecutor, AgentExecutorRegistry, InMemoryExecutorRegistry, LocalAgent};
pub use workflow::{HttpWorkflowEngine, WorkflowEngine, WorkflowRequest, WorkflowResponse};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::contract::ContractEnforcer;
use crate::error::{Error, Result};
use crate::memory::ContextProvider;
use crate::types::{Run, StepResult, Task, TodoItem};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct StepEngineConfig {
    /// Ceiling on a direct executor invocation
    pub direct_timeout: Duration,
}

impl Default for StepEngineConfig {
    fn default() -> Self {
        Self {
            direct_timeout: Duration::from_secs(120),
        }
    }
}

/// Executes single steps with workflow-first, direct-fallback dispatch
pub struct StepEngine {
    workflow: Arc<dyn WorkflowEngine>,
    registry: Arc<dyn AgentExecutorRegistry>,
    contract: Arc<dyn ContractEnforcer>,
    context: Arc<dyn ContextProvider>,
    config: StepEngineConfig,
}

impl StepEngine {
    /// Create an engine over the given collaborators
    #[must_use]
    pub fn new(
        workflow: Arc<dyn WorkflowEngine>,
        registry: Arc<dyn AgentExecutorRegistry>,
        contract: Arc<dyn ContractEnforcer>,
        context: Arc<dyn ContextProvider>,
    ) -> Self {
        Self {
            workflow,
            registry,
            contract,
            context,
            config: StepEngineConfig::default(),
        }
    }

    /// Override the engine configuration
    #[must_use]
    pub fn with_config(mut self, config: StepEngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Execute one ready step and return its normalized result.
    ///
    /// Contract failures (pre or post) are fatal and surface as errors;
    /// workflow unavailability is recoverable and triggers the direct
    /// fallback; a direct-executor error is fatal for the step.
    pub async fn execute(
        &self,
        run: &Run,
        task: &Task,
        step: &TodoItem,
        model: &str,
    ) -> Result<StepResult> {
        self.contract.validate_action(&step.agent_type).await?;

        let context = self
            .context
            .context_for(&task.user_id, &task.query)
            .await?;

        let request = WorkflowRequest {
            run_id: run.id,
            task_id: task.id,
            step_id: step.id.clone(),
            description: step.description.clone(),
            agent_type: step.agent_type.clone(),
            context: context.clone(),
            model: model.to_string(),
            allow_fallback: true,
        };

        let start = std::time::Instant::now();
        let result = match self.workflow.execute_step(&request).await {
            Ok(response) if response.success => {
                debug!(step_id = %step.id, "Workflow engine handled step");
                Self::normalize(response, model, start.elapsed().as_millis() as u64)
            }
            Ok(response) => {
                let detail = response
                    .error
                    .unwrap_or_else(|| "workflow reported failure without detail".to_string());
                info!(step_id = %step.id, detail = %detail, "Workflow payload failure, falling back to direct execution");
                self.execute_direct(step, &context, model, detail).await?
            }
            Err(Error::WorkflowUnavailable(detail)) => {
                info!(step_id = %step.id, detail = %detail, "Workflow engine unavailable, falling back to direct execution");
                self.execute_direct(step, &context, model, detail).await?
            }
            Err(other) => return Err(other),
        };

        if result.is_success() {
            self.contract.validate_artifacts(step, &result).await?;
        }
        Ok(result)
    }

    /// Second tier: the directly-registered agent executor
    async fn execute_direct(
        &self,
        step: &TodoItem,
        context: &str,
        model: &str,
        workflow_detail: String,
    ) -> Result<StepResult> {
        let executor = self.registry.resolve(&step.agent_type);

        let result = tokio::time::timeout(
            self.config.direct_timeout,
            executor.execute(step, context, model),
        )
        .await
        .map_err(|_| {
            warn!(step_id = %step.id, "Direct executor timed out");
            Error::AgentExecution(format!(
                "agent '{}' timed out after {:?}",
                step.agent_type, self.config.direct_timeout
            ))
        })??;

        // Carry the workflow failure detail for observability
        Ok(match result {
            StepResult::Success {
                outputs,
                artifact_ids,
                tokens_used,
                duration_ms,
                model_used,
                ..
            } => StepResult::Success {
                outputs,
                artifact_ids,
                tokens_used,
                duration_ms,
                model_used,
                workflow_error: Some(workflow_detail),
            },
            failure @ StepResult::Failure { .. } => failure,
        })
    }

    /// Normalize a workflow payload into a step result
    fn normalize(response: WorkflowResponse, model: &str, duration_ms: u64) -> StepResult {
        StepResult::Success {
            outputs: response.outputs,
            artifact_ids: response.artifact_ids,
            tokens_used: response.tokens_used,
            duration_ms,
            model_used: Some(model.to_string()),
            workflow_error: None,
        }
    }
}
