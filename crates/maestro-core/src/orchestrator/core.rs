use dashmap::DashMap;
use maestro_models::{
    BudgetLedger, BudgetStatus, FailureHistory, ModelDecision, ModelSelector, TierPreference,
    UsageReport,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::approval::{Approval, ApprovalGate, HeuristicGate};
use crate::engine::StepEngine;
use crate::error::{Error, Result};
use crate::events::{ActivityEvent, EventBus};
use crate::memory::ContextProvider;
use crate::planner::Planner;
use crate::store::Store;
use crate::types::{LibraryEntry, Project, Run, Task, TerminationRecord, TodoItem};

/// Orchestrator tuning knobs
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Ceiling on step dispatches per task
    pub max_step_invocations: u32,
    /// Ceiling on accumulated tokens per task
    pub max_task_tokens: u64,
    /// Tier preference applied to every selection
    pub tier_preference: TierPreference,
    /// Optional per-request cost ceiling passed to the selector (USD)
    pub max_cost_per_request: Option<f64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_step_invocations: 20,
            max_task_tokens: 200_000,
            tier_preference: TierPreference::None,
            max_cost_per_request: None,
        }
    }
}

/// The run orchestrator.
///
/// One instance serves the whole process; handlers share it behind an
/// `Arc`. A `DashMap` of active run ids guards against concurrent
/// execution of the same run.
pub struct Orchestrator {
    pub(super) store: Store,
    pub(super) planner: Arc<dyn Planner>,
    pub(super) engine: StepEngine,
    pub(super) gate: Arc<dyn ApprovalGate>,
    pub(super) context: Arc<dyn ContextProvider>,
    pub(super) ledger: Arc<BudgetLedger>,
    pub(super) selector: Arc<ModelSelector>,
    pub(super) failures: Arc<FailureHistory>,
    pub(super) event_bus: Option<Arc<EventBus>>,
    pub(super) config: OrchestratorConfig,
    pub(super) active_runs: DashMap<Uuid, ()>,
}

impl Orchestrator {
    /// Create an orchestrator over the given collaborators
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        planner: Arc<dyn Planner>,
        engine: StepEngine,
        context: Arc<dyn ContextProvider>,
        ledger: Arc<BudgetLedger>,
        selector: Arc<ModelSelector>,
        failures: Arc<FailureHistory>,
    ) -> Self {
        Self {
            store,
            planner,
            engine,
            gate: Arc::new(HeuristicGate::new()),
            context,
            ledger,
            selector,
            failures,
            event_bus: None,
            config: OrchestratorConfig::default(),
            active_runs: DashMap::new(),
        }
    }

    /// Replace the risk gate
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Attach an event bus for lifecycle observation
    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Override the orchestrator configuration
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub(super) fn emit(&self, event: ActivityEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Resolve the named project, creating the user's `default` project on
    /// first use.
    pub async fn resolve_project(&self, user_id: &str, project: Option<&str>) -> Result<Project> {
        let name = project.unwrap_or("default");
        if let Some(existing) = self.store.get_project_by_name(user_id, name).await? {
            return Ok(existing);
        }
        let project = Project::new(user_id, name);
        self.store.create_project(&project).await?;
        info!(user_id, name, "Created project");
        Ok(project)
    }

    /// Plan a query into a persisted task in `planning` status.
    ///
    /// Planner failures propagate unchanged; no task is persisted for a
    /// query the planner rejected.
    #[instrument(skip(self, query), fields(user_id = %user_id))]
    pub async fn create_task(
        &self,
        user_id: &str,
        query: &str,
        project: Option<&str>,
    ) -> Result<Task> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }

        let project = self.resolve_project(user_id, project).await?;
        let context = self.context.context_for(user_id, query).await?;
        let plan = self.planner.plan(query, &context).await?;

        if plan.steps.is_empty() {
            return Err(Error::Planning(
                "planner produced an empty plan".to_string(),
            ));
        }

        // plan indices become stable step ids before anything persists
        let step_ids: Vec<String> = (1..=plan.steps.len()).map(|i| format!("step-{i}")).collect();
        let todo_list: Vec<TodoItem> = plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, planned)| {
                let mut item = TodoItem::new(
                    step_ids[i].clone(),
                    planned.description.clone(),
                    planned.agent_type.clone(),
                );
                for &dep in &planned.depends_on {
                    if let Some(dep_id) = step_ids.get(dep) {
                        if dep != i {
                            item.depends_on.push(dep_id.clone());
                        }
                    }
                }
                item.require_approval = planned.require_approval;
                item
            })
            .collect();

        let mut task = Task::new(user_id, project.id.clone(), query, todo_list);
        task.plan_summary = plan.summary;
        self.store.create_task(&task).await?;

        info!(task_id = %task.id, steps = task.todo_list.len(), "Task planned");
        Ok(task)
    }

    /// Plan a query and allocate a run for it
    #[instrument(skip(self, query), fields(user_id = %user_id))]
    pub async fn create_run(
        &self,
        user_id: &str,
        query: &str,
        project: Option<&str>,
    ) -> Result<Run> {
        let task = self.create_task(user_id, query, project).await?;
        let run = Run::new(&task);
        self.store.create_run(&run).await?;

        self.emit(ActivityEvent::RunCreated {
            run_id: run.id,
            task_id: task.id,
            user_id: user_id.to_string(),
        });
        Ok(run)
    }

    // ------------------------------------------------------------------
    // Read accessors for the API layer
    // ------------------------------------------------------------------

    /// Fetch a run
    pub async fn get_run(&self, run_id: Uuid) -> Result<Run> {
        self.store.get_run(run_id).await?.ok_or(Error::NotFound {
            entity: "run",
            id: run_id.to_string(),
        })
    }

    /// List a user's runs, newest first
    pub async fn list_runs(&self, user_id: &str, limit: i64) -> Result<Vec<Run>> {
        self.store.list_runs(user_id, limit).await
    }

    /// Fetch a task
    pub async fn get_task(&self, task_id: Uuid) -> Result<Task> {
        self.store.get_task(task_id).await?.ok_or(Error::NotFound {
            entity: "task",
            id: task_id.to_string(),
        })
    }

    /// Fetch the termination record for a run, if it terminated
    pub async fn get_termination(&self, run_id: Uuid) -> Result<Option<TerminationRecord>> {
        self.store.get_termination(run_id).await
    }

    /// Artifact ids produced across a run's completed steps
    pub async fn run_artifacts(&self, run_id: Uuid) -> Result<Vec<String>> {
        let run = self.get_run(run_id).await?;
        let task = self.get_task(run.task_id).await?;
        Ok(task
            .todo_list
            .iter()
            .filter_map(|s| s.result.as_ref())
            .flat_map(|r| r.artifact_ids().iter().cloned())
            .collect())
    }

    /// A user's pending approvals, oldest first
    pub async fn pending_approvals(&self, user_id: &str) -> Result<Vec<Approval>> {
        self.store.pending_approvals(user_id).await
    }

    /// Fetch an approval
    pub async fn get_approval(&self, approval_id: Uuid) -> Result<Approval> {
        self.store
            .get_approval(approval_id)
            .await?
            .ok_or(Error::NotFound {
                entity: "approval",
                id: approval_id.to_string(),
            })
    }

    /// Current budget position for a user
    pub async fn budget_status(&self, user_id: &str) -> BudgetStatus {
        self.ledger.status(user_id).await
    }

    /// Per-model spend breakdown for a user
    pub async fn usage_report(&self, user_id: &str) -> UsageReport {
        self.ledger.usage_report(user_id).await
    }

    /// Audit record of the selector decision for a task
    pub async fn model_decision(&self, task_id: Uuid) -> Option<ModelDecision> {
        self.selector.decision_for(task_id).await
    }

    /// List a user's projects
    pub async fn list_projects(&self, user_id: &str) -> Result<Vec<Project>> {
        self.store.list_projects(user_id).await
    }

    /// Add a document to the user's library
    pub async fn add_library_entry(&self, entry: &LibraryEntry) -> Result<()> {
        self.store.create_library_entry(entry).await
    }

    /// Fetch a library entry
    pub async fn get_library_entry(&self, id: &str) -> Result<LibraryEntry> {
        self.store
            .get_library_entry(id)
            .await?
            .ok_or_else(|| Error::NotFound {
                entity: "library entry",
                id: id.to_string(),
            })
    }

    /// List a user's library, newest first
    pub async fn list_library(&self, user_id: &str) -> Result<Vec<LibraryEntry>> {
        self.store.list_library(user_id).await
    }

    /// Remove a library entry
    pub async fn delete_library_entry(&self, id: &str) -> Result<()> {
        if !self.store.delete_library_entry(id).await? {
            return Err(Error::NotFound {
                entity: "library entry",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Store liveness, for health checks
    pub async fn ping_store(&self) -> Result<()> {
        self.store.ping().await
    }
}
