use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default timeout for workflow engine calls
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Request sent to the external workflow engine for one step
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRequest {
    /// Run the step belongs to
    pub run_id: Uuid,
    /// Task the step belongs to
    pub task_id: Uuid,
    /// Step id within the plan
    pub step_id: String,
    /// What the step should accomplish
    pub description: String,
    /// Target agent type
    pub agent_type: String,
    /// Opaque memory context string
    pub context: String,
    /// Model the step should run with
    pub model: String,
    /// Tells the engine a local fallback exists for this step
    pub allow_fallback: bool,
}

/// Normalized payload returned by the workflow engine
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowResponse {
    /// Whether the workflow reports logical success
    pub success: bool,
    /// Named outputs
    #[serde(default)]
    pub outputs: HashMap<String, serde_json::Value>,
    /// Ids of produced artifacts
    #[serde(default)]
    pub artifact_ids: Vec<String>,
    /// Tokens the workflow consumed
    #[serde(default)]
    pub tokens_used: u32,
    /// Failure detail when `success` is false
    #[serde(default)]
    pub error: Option<String>,
}

/// External system capable of executing a step via an automated pipeline
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Execute one step. Implementations must resolve within their
    /// configured timeout; a hang is never acceptable.
    async fn execute_step(&self, request: &WorkflowRequest) -> Result<WorkflowResponse>;
}

/// HTTP client for the external workflow engine
pub struct HttpWorkflowEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorkflowEngine {
    /// Create a client for the engine at `base_url` with the default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a client with an explicit call timeout
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::WorkflowUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl WorkflowEngine for HttpWorkflowEngine {
    async fn execute_step(&self, request: &WorkflowRequest) -> Result<WorkflowResponse> {
        let url = format!("{}/api/workflows/execute", self.base_url);
        debug!(step_id = %request.step_id, url = %url, "Dispatching step to workflow engine");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::WorkflowUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(step_id = %request.step_id, %status, "Workflow engine returned error status");
            return Err(Error::WorkflowUnavailable(format!(
                "workflow engine returned {status}"
            )));
        }

        response
            .json::<WorkflowResponse>()
            .await
            .map_err(|e| Error::WorkflowUnavailable(format!("invalid workflow payload: {e}")))
    }
}
