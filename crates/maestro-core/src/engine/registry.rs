use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::Result;
use crate::types::{StepResult, TodoItem};

/// A directly-registered agent implementation
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Execute one step against the agent. `context` is the opaque memory
    /// context string; `model` is the selector's choice for this step.
    async fn execute(&self, step: &TodoItem, context: &str, model: &str) -> Result<StepResult>;
}

/// Resolves an executor for an agent type.
///
/// Held by reference on the orchestrator and populated at startup; an
/// absent registration falls through to a default factory rather than a
/// nil lookup.
pub trait AgentExecutorRegistry: Send + Sync {
    /// Resolve the executor for an agent type
    fn resolve(&self, agent_type: &str) -> Arc<dyn AgentExecutor>;
}

/// Registry backed by a map built at startup
pub struct InMemoryExecutorRegistry {
    executors: HashMap<String, Arc<dyn AgentExecutor>>,
    default: Arc<dyn AgentExecutor>,
}

impl InMemoryExecutorRegistry {
    /// Create a registry whose fallback is the generic local agent
    #[must_use]
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
            default: Arc::new(LocalAgent::new("generic")),
        }
    }

    /// Replace the default-factory executor
    #[must_use]
    pub fn with_default(mut self, executor: Arc<dyn AgentExecutor>) -> Self {
        self.default = executor;
        self
    }

    /// Register an executor for an agent type
    #[must_use]
    pub fn with_executor(
        mut self,
        agent_type: impl Into<String>,
        executor: Arc<dyn AgentExecutor>,
    ) -> Self {
        self.executors.insert(agent_type.into(), executor);
        self
    }
}

impl Default for InMemoryExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentExecutorRegistry for InMemoryExecutorRegistry {
    fn resolve(&self, agent_type: &str) -> Arc<dyn AgentExecutor> {
        match self.executors.get(agent_type) {
            Some(executor) => Arc::clone(executor),
            None => {
                debug!(agent_type, "No registered executor, using default factory");
                Arc::clone(&self.default)
            }
        }
    }
}

/// Generic local agent used when no specific executor is registered.
///
/// Produces a normalized acknowledgement result; real agent
/// implementations live outside this crate and are registered at startup.
pub struct LocalAgent {
    name: String,
}

impl LocalAgent {
    /// Create a local agent with a display name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl AgentExecutor for LocalAgent {
    async fn execute(&self, step: &TodoItem, context: &str, model: &str) -> Result<StepResult> {
        let start = Instant::now();
        // Rough local token accounting: context plus description
        let tokens_used = ((step.description.len() + context.len()) / 4) as u32;
        let outputs = HashMap::from([
            (
                "response".to_string(),
                serde_json::json!(format!(
                    "{} agent handled: {}",
                    self.name, step.description
                )),
            ),
            ("agent".to_string(), serde_json::json!(self.name.clone())),
        ]);
        Ok(StepResult::Success {
            outputs,
            artifact_ids: Vec::new(),
            tokens_used,
            duration_ms: start.elapsed().as_millis() as u64,
            model_used: Some(model.to_string()),
            workflow_error: None,
        })
    }
}
