//! Shared application state
//!
//! Wires the orchestrator and its collaborators from configuration. All
//! dependencies are constructed here and injected; nothing downstream
//! reaches for globals.

use anyhow::{Context, Result};
use async_trait::async_trait;
use maestro_core::engine::{
    HttpWorkflowEngine, InMemoryExecutorRegistry, StepEngine, WorkflowEngine, WorkflowRequest,
    WorkflowResponse,
};
use maestro_core::{
    AllowlistEnforcer, EventBus, NoContext, Orchestrator, OrchestratorConfig, Plan, PlannedStep,
    Planner, Store,
};
use maestro_models::{
    default_pricing, BudgetLedger, BudgetLimits, FailureHistory, ModelSelector, SelectorConfig,
    TierPreference,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::config::AppConfig;

/// State shared across HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub event_bus: Arc<EventBus>,
}

/// Stand-in when no workflow engine is configured; every dispatch falls
/// straight through to the direct executor.
struct DisabledWorkflow;

#[async_trait]
impl WorkflowEngine for DisabledWorkflow {
    async fn execute_step(
        &self,
        _request: &WorkflowRequest,
    ) -> maestro_core::Result<WorkflowResponse> {
        Err(maestro_core::Error::WorkflowUnavailable(
            "workflow engine not configured".to_string(),
        ))
    }
}

/// Keyword-based fallback planner.
///
/// Real deployments plug in an LLM-backed planner; this one turns any
/// query into a single step routed to an agent type guessed from the
/// query text, so the server works out of the box.
struct KeywordPlanner;

#[async_trait]
impl Planner for KeywordPlanner {
    async fn plan(&self, query: &str, _context: &str) -> maestro_core::Result<Plan> {
        let lower = query.to_lowercase();
        let agent_type = if ["implement", "code", "fix", "refactor", "build"]
            .iter()
            .any(|k| lower.contains(k))
        {
            "coding"
        } else if ["research", "find", "search", "investigate"]
            .iter()
            .any(|k| lower.contains(k))
        {
            "research"
        } else if ["analyze", "compare", "evaluate", "review"]
            .iter()
            .any(|k| lower.contains(k))
        {
            "analysis"
        } else {
            "generic"
        };

        Ok(Plan {
            steps: vec![PlannedStep::new(query, agent_type)],
            summary: Some(format!("single {agent_type} step")),
        })
    }
}

fn parse_preference(value: &str) -> TierPreference {
    match value {
        "prefer_local" => TierPreference::PreferLocal,
        "prefer_cloud" => TierPreference::PreferCloud,
        _ => TierPreference::None,
    }
}

impl AppState {
    /// Build the full dependency graph from configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store = Store::from_path(Path::new(&config.database.path))
            .await
            .context("Failed to open store")?;

        let ledger = Arc::new(BudgetLedger::new(
            BudgetLimits {
                daily_limit_usd: config.budget.daily_limit_usd,
                monthly_limit_usd: config.budget.monthly_limit_usd,
                warning_ratio: config.budget.warning_ratio,
            },
            default_pricing(),
        ));
        let failures = Arc::new(FailureHistory::new());
        let selector = Arc::new(ModelSelector::new(
            Arc::clone(&ledger),
            Arc::clone(&failures),
            SelectorConfig::default(),
        ));

        let workflow: Arc<dyn WorkflowEngine> = match &config.workflow.base_url {
            Some(base_url) => {
                info!(%base_url, "Workflow engine enabled");
                Arc::new(HttpWorkflowEngine::with_timeout(
                    base_url.clone(),
                    Duration::from_secs(config.workflow.timeout_secs),
                )?)
            }
            None => {
                info!("No workflow engine configured, running direct executors only");
                Arc::new(DisabledWorkflow)
            }
        };

        let engine = StepEngine::new(
            workflow,
            Arc::new(InMemoryExecutorRegistry::new()),
            Arc::new(AllowlistEnforcer::new()),
            Arc::new(NoContext),
        );

        let event_bus = Arc::new(EventBus::default());
        let orchestrator = Orchestrator::new(
            store,
            Arc::new(KeywordPlanner),
            engine,
            Arc::new(NoContext),
            ledger,
            selector,
            failures,
        )
        .with_event_bus(Arc::clone(&event_bus))
        .with_config(OrchestratorConfig {
            max_step_invocations: config.orchestrator.max_step_invocations,
            max_task_tokens: config.orchestrator.max_task_tokens,
            tier_preference: parse_preference(&config.orchestrator.tier_preference),
            max_cost_per_request: config.orchestrator.max_cost_per_request,
        });

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            event_bus,
        })
    }
}
