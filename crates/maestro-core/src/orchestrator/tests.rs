use super::*;
use crate::approval::{ApprovalType, HeuristicGate};
use crate::contract::AllowlistEnforcer;
use crate::engine::{
    AgentExecutor, AgentExecutorRegistry, InMemoryExecutorRegistry, StepEngine, WorkflowEngine,
    WorkflowRequest, WorkflowResponse,
};
use crate::error::Error;
use crate::events::{ActivityEvent, EventBus};
use crate::memory::NoContext;
use crate::planner::{Plan, PlannedStep, Planner};
use crate::store::Store;
use crate::types::{
    Run, RunStatus, StepResult, StepStatus, TaskStatus, TerminationReason, TodoItem,
};
use async_trait::async_trait;
use maestro_models::{
    default_pricing, BudgetLedger, BudgetLimits, FailureHistory, ModelSelector, SelectorConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct ScriptedPlanner(Plan);

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, _query: &str, _context: &str) -> crate::error::Result<Plan> {
        Ok(self.0.clone())
    }
}

struct RefusingPlanner;

#[async_trait]
impl Planner for RefusingPlanner {
    async fn plan(&self, _query: &str, _context: &str) -> crate::error::Result<Plan> {
        Err(Error::Planning("query is out of scope".to_string()))
    }
}

/// Workflow engine that handles every step with a fixed token cost
struct OkWorkflow {
    tokens: u32,
}

#[async_trait]
impl WorkflowEngine for OkWorkflow {
    async fn execute_step(
        &self,
        request: &WorkflowRequest,
    ) -> crate::error::Result<WorkflowResponse> {
        Ok(WorkflowResponse {
            success: true,
            outputs: HashMap::from([(
                "summary".to_string(),
                serde_json::json!(format!("handled {}", request.step_id)),
            )]),
            artifact_ids: vec![format!("artifact-{}", request.step_id)],
            tokens_used: self.tokens,
            error: None,
        })
    }
}

struct DownWorkflow;

#[async_trait]
impl WorkflowEngine for DownWorkflow {
    async fn execute_step(
        &self,
        _request: &WorkflowRequest,
    ) -> crate::error::Result<WorkflowResponse> {
        Err(Error::WorkflowUnavailable("connection refused".to_string()))
    }
}

struct CrashingAgent;

#[async_trait]
impl AgentExecutor for CrashingAgent {
    async fn execute(
        &self,
        _step: &TodoItem,
        _context: &str,
        _model: &str,
    ) -> crate::error::Result<StepResult> {
        Err(Error::AgentExecution("agent crashed".to_string()))
    }
}

fn plan(steps: Vec<PlannedStep>) -> Plan {
    Plan {
        steps,
        summary: Some("scripted plan".to_string()),
    }
}

fn two_step_plan() -> Plan {
    let mut second = PlannedStep::new("write up the findings", "analysis");
    second.depends_on = vec![0];
    plan(vec![
        PlannedStep::new("gather sources", "research"),
        second,
    ])
}

struct Fixture {
    orchestrator: Arc<Orchestrator>,
    failures: Arc<FailureHistory>,
}

async fn build(
    planner: Arc<dyn Planner>,
    workflow: Arc<dyn WorkflowEngine>,
    registry: Arc<dyn AgentExecutorRegistry>,
    config: OrchestratorConfig,
    bus: Option<Arc<EventBus>>,
) -> Fixture {
    let store = Store::in_memory().await.unwrap();
    let ledger = Arc::new(BudgetLedger::new(BudgetLimits::default(), default_pricing()));
    let failures = Arc::new(FailureHistory::new());
    let selector = Arc::new(ModelSelector::new(
        Arc::clone(&ledger),
        Arc::clone(&failures),
        SelectorConfig::default(),
    ));
    let engine = StepEngine::new(
        workflow,
        registry,
        Arc::new(AllowlistEnforcer::new()),
        Arc::new(NoContext),
    );
    let mut orchestrator = Orchestrator::new(
        store,
        planner,
        engine,
        Arc::new(NoContext),
        ledger,
        selector,
        Arc::clone(&failures),
    )
    .with_gate(Arc::new(HeuristicGate::new()))
    .with_config(config);
    if let Some(bus) = bus {
        orchestrator = orchestrator.with_event_bus(bus);
    }
    Fixture {
        orchestrator: Arc::new(orchestrator),
        failures,
    }
}

async fn simple(plan: Plan) -> Fixture {
    build(
        Arc::new(ScriptedPlanner(plan)),
        Arc::new(OkWorkflow { tokens: 40 }),
        Arc::new(InMemoryExecutorRegistry::new()),
        OrchestratorConfig::default(),
        None,
    )
    .await
}

async fn wait_terminated(orchestrator: &Orchestrator, run_id: Uuid) -> Run {
    for _ in 0..100 {
        let run = orchestrator.get_run(run_id).await.unwrap();
        if run.is_terminated() {
            return run;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} did not terminate");
}

#[tokio::test]
async fn test_run_completes_all_steps() {
    let f = simple(two_step_plan()).await;
    let run = f
        .orchestrator
        .create_run("u1", "research the topic", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let run = f.orchestrator.get_run(run.id).await.unwrap();
    assert!(run.is_terminated());
    assert_eq!(run.termination_reason, Some(TerminationReason::Completed));
    assert_eq!(run.total_tokens, 80);

    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.steps_completed, vec!["step-1", "step-2"]);
    assert_eq!(task.total_invocations, 2);

    let record = f
        .orchestrator
        .get_termination(run.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.steps_planned, 2);
    assert_eq!(record.steps_completed, 2);

    let artifacts = f.orchestrator.run_artifacts(run.id).await.unwrap();
    assert_eq!(artifacts.len(), 2);
}

#[tokio::test]
async fn test_workflow_down_falls_back_to_direct() {
    let f = build(
        Arc::new(ScriptedPlanner(two_step_plan())),
        Arc::new(DownWorkflow),
        Arc::new(InMemoryExecutorRegistry::new()),
        OrchestratorConfig::default(),
        None,
    )
    .await;
    let run = f
        .orchestrator
        .create_run("u1", "research the topic", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let run = f.orchestrator.get_run(run.id).await.unwrap();
    assert_eq!(run.termination_reason, Some(TerminationReason::Completed));

    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    for step in &task.todo_list {
        match step.result.as_ref().unwrap() {
            StepResult::Success { workflow_error, .. } => {
                assert_eq!(workflow_error.as_deref(), Some("connection refused"));
            }
            StepResult::Failure { .. } => panic!("expected fallback success"),
        }
    }
}

#[tokio::test]
async fn test_agent_error_terminates_run_and_records_failure() {
    let f = build(
        Arc::new(ScriptedPlanner(two_step_plan())),
        Arc::new(DownWorkflow),
        Arc::new(InMemoryExecutorRegistry::new().with_executor("research", Arc::new(CrashingAgent))),
        OrchestratorConfig::default(),
        None,
    )
    .await;
    let run = f
        .orchestrator
        .create_run("u1", "research the topic", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let run = f.orchestrator.get_run(run.id).await.unwrap();
    assert_eq!(run.termination_reason, Some(TerminationReason::AgentError));

    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    let step = &task.todo_list[0];
    assert_eq!(step.status, StepStatus::Failed);
    assert!(step.error.as_ref().unwrap().contains("agent crashed"));
    assert!(task.steps_completed.is_empty());

    assert_eq!(f.failures.recent(&task.project_id, "research", 7).await, 1);
}

#[tokio::test]
async fn test_invocation_budget_exhaustion() {
    let f = build(
        Arc::new(ScriptedPlanner(two_step_plan())),
        Arc::new(OkWorkflow { tokens: 40 }),
        Arc::new(InMemoryExecutorRegistry::new()),
        OrchestratorConfig {
            max_step_invocations: 1,
            ..OrchestratorConfig::default()
        },
        None,
    )
    .await;
    let run = f
        .orchestrator
        .create_run("u1", "research the topic", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let run = f.orchestrator.get_run(run.id).await.unwrap();
    assert_eq!(
        run.termination_reason,
        Some(TerminationReason::BudgetExhausted)
    );

    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    assert_eq!(task.steps_completed, vec!["step-1"]);
    assert_eq!(task.total_invocations, 1);
    // the blocked step fails rather than lingering pending
    assert_eq!(task.todo_list[1].status, StepStatus::Failed);
    assert!(task.todo_list[1]
        .error
        .as_ref()
        .unwrap()
        .contains("invocation budget"));
}

#[tokio::test]
async fn test_token_budget_exhaustion() {
    let f = build(
        Arc::new(ScriptedPlanner(plan(vec![
            PlannedStep::new("first pass", "research"),
            PlannedStep::new("second pass", "research"),
            PlannedStep::new("third pass", "research"),
        ]))),
        Arc::new(OkWorkflow { tokens: 40 }),
        Arc::new(InMemoryExecutorRegistry::new()),
        OrchestratorConfig {
            max_task_tokens: 50,
            ..OrchestratorConfig::default()
        },
        None,
    )
    .await;
    let run = f
        .orchestrator
        .create_run("u1", "research the topic", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let run = f.orchestrator.get_run(run.id).await.unwrap();
    assert_eq!(
        run.termination_reason,
        Some(TerminationReason::BudgetExhausted)
    );

    // the step that crossed the ceiling still completed; the next fails
    // without ever dispatching
    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    assert_eq!(task.steps_completed, vec!["step-1", "step-2"]);
    assert_eq!(task.todo_list[2].status, StepStatus::Failed);
    assert!(task.todo_list[2]
        .error
        .as_ref()
        .unwrap()
        .contains("token budget"));
}

#[tokio::test]
async fn test_resume_after_approval_honors_token_budget() {
    let mut second = PlannedStep::new("write up the findings", "analysis");
    second.depends_on = vec![0];
    let f = build(
        Arc::new(ScriptedPlanner(plan(vec![
            PlannedStep::new("deploy the service to production", "coding"),
            second,
        ]))),
        Arc::new(OkWorkflow { tokens: 60 }),
        Arc::new(InMemoryExecutorRegistry::new()),
        OrchestratorConfig {
            max_task_tokens: 50,
            ..OrchestratorConfig::default()
        },
        None,
    )
    .await;

    let run = f.orchestrator.create_run("u1", "ship it", None).await.unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    // the first step spent the whole budget, then suspended on risk
    let suspended = f.orchestrator.get_run(run.id).await.unwrap();
    assert_eq!(suspended.status, RunStatus::WaitingApproval);

    let pending = f.orchestrator.pending_approvals("u1").await.unwrap();
    f.orchestrator
        .clone()
        .respond_to_approval(pending[0].id, true, None)
        .await
        .unwrap();
    let run = wait_terminated(&f.orchestrator, run.id).await;
    assert_eq!(
        run.termination_reason,
        Some(TerminationReason::BudgetExhausted)
    );

    // no further step executes on an exhausted budget
    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    assert_eq!(task.steps_completed, vec!["step-1"]);
    assert_eq!(task.todo_list[1].status, StepStatus::Failed);
    assert!(task.todo_list[1].result.is_none());
    assert_eq!(task.total_tokens, 60);
}

#[tokio::test]
async fn test_static_gate_suspends_then_approval_resumes() {
    let mut gated = PlannedStep::new("send the weekly report", "communication");
    gated.require_approval = true;
    let f = simple(plan(vec![gated])).await;

    let run = f
        .orchestrator
        .create_run("u1", "send the report", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let suspended = f.orchestrator.get_run(run.id).await.unwrap();
    assert_eq!(suspended.status, RunStatus::WaitingApproval);

    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::ApprovalNeeded);
    // statically gated step never ran
    assert_eq!(task.todo_list[0].status, StepStatus::Pending);
    assert!(task.todo_list[0].result.is_none());

    let pending = f.orchestrator.pending_approvals("u1").await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].approval_type, ApprovalType::StaticGate);
    assert_eq!(pending[0].step_id, "step-1");

    // a waiting run has exactly one pending approval referencing it
    let for_run = f
        .orchestrator
        .store
        .pending_approvals_for_run(run.id)
        .await
        .unwrap();
    assert_eq!(for_run.len(), 1);
    assert_eq!(for_run[0].id, pending[0].id);

    f.orchestrator
        .clone()
        .respond_to_approval(pending[0].id, true, None)
        .await
        .unwrap();
    let run = wait_terminated(&f.orchestrator, run.id).await;
    assert_eq!(run.termination_reason, Some(TerminationReason::Completed));
    assert!(f
        .orchestrator
        .store
        .pending_approvals_for_run(run.id)
        .await
        .unwrap()
        .is_empty());

    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    assert_eq!(task.steps_completed, vec!["step-1"]);
    match task.todo_list[0].result.as_ref().unwrap() {
        StepResult::Success { outputs, .. } => {
            assert_eq!(outputs.get("approved"), Some(&serde_json::json!(true)));
        }
        StepResult::Failure { .. } => panic!("expected marker result"),
    }
}

#[tokio::test]
async fn test_dynamic_risk_suspends_after_execution() {
    let f = simple(plan(vec![PlannedStep::new(
        "deploy the service to production",
        "coding",
    )]))
    .await;

    let run = f
        .orchestrator
        .create_run("u1", "ship it", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let suspended = f.orchestrator.get_run(run.id).await.unwrap();
    assert_eq!(suspended.status, RunStatus::WaitingApproval);

    // the step ran and its result is recorded, but completion waits for
    // the human decision
    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    assert_eq!(task.todo_list[0].status, StepStatus::Completed);
    assert!(task.todo_list[0].result.is_some());
    assert!(task.steps_completed.is_empty());

    let pending = f.orchestrator.pending_approvals("u1").await.unwrap();
    assert_eq!(pending[0].approval_type, ApprovalType::DynamicRisk);

    f.orchestrator
        .clone()
        .respond_to_approval(pending[0].id, true, Some("go ahead".to_string()))
        .await
        .unwrap();
    let run = wait_terminated(&f.orchestrator, run.id).await;
    assert_eq!(run.termination_reason, Some(TerminationReason::Completed));
}

#[tokio::test]
async fn test_rejection_terminates_run() {
    let mut gated = PlannedStep::new("send the weekly report", "communication");
    gated.require_approval = true;
    let f = simple(plan(vec![gated])).await;

    let run = f
        .orchestrator
        .create_run("u1", "send the report", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let pending = f.orchestrator.pending_approvals("u1").await.unwrap();
    f.orchestrator
        .clone()
        .respond_to_approval(pending[0].id, false, Some("not this week".to_string()))
        .await
        .unwrap();

    let run = f.orchestrator.get_run(run.id).await.unwrap();
    assert!(run.is_terminated());
    assert_eq!(
        run.termination_reason,
        Some(TerminationReason::ApprovalRejected)
    );

    let task = f.orchestrator.get_task(run.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.todo_list[0].status, StepStatus::Failed);
    assert_eq!(task.todo_list[0].error.as_deref(), Some("rejected by user"));
}

#[tokio::test]
async fn test_second_response_is_rejected() {
    let mut gated = PlannedStep::new("send the weekly report", "communication");
    gated.require_approval = true;
    let f = simple(plan(vec![gated])).await;

    let run = f
        .orchestrator
        .create_run("u1", "send the report", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let pending = f.orchestrator.pending_approvals("u1").await.unwrap();
    f.orchestrator
        .clone()
        .respond_to_approval(pending[0].id, true, None)
        .await
        .unwrap();

    let err = f
        .orchestrator
        .clone()
        .respond_to_approval(pending[0].id, false, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_execute_terminated_run_is_noop() {
    let f = simple(two_step_plan()).await;
    let run = f
        .orchestrator
        .create_run("u1", "research the topic", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let first = f.orchestrator.get_run(run.id).await.unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();
    let second = f.orchestrator.get_run(run.id).await.unwrap();

    assert_eq!(first.terminated_at, second.terminated_at);
    assert_eq!(first.termination_reason, second.termination_reason);
}

#[tokio::test]
async fn test_dependency_cycle_fails_instead_of_spinning() {
    let mut first = PlannedStep::new("first half", "research");
    first.depends_on = vec![1];
    let mut second = PlannedStep::new("second half", "research");
    second.depends_on = vec![0];
    let f = simple(plan(vec![first, second])).await;

    let run = f
        .orchestrator
        .create_run("u1", "research the topic", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let run = f.orchestrator.get_run(run.id).await.unwrap();
    assert_eq!(run.termination_reason, Some(TerminationReason::AgentError));
    let record = f
        .orchestrator
        .get_termination(run.id)
        .await
        .unwrap()
        .unwrap();
    assert!(record.details.contains("step-1"));
    assert!(record.details.contains("step-2"));
}

#[tokio::test]
async fn test_planner_failure_propagates_and_persists_nothing() {
    let f = build(
        Arc::new(RefusingPlanner),
        Arc::new(OkWorkflow { tokens: 40 }),
        Arc::new(InMemoryExecutorRegistry::new()),
        OrchestratorConfig::default(),
        None,
    )
    .await;

    let err = f
        .orchestrator
        .create_run("u1", "do something weird", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Planning(_)));
    assert!(f.orchestrator.list_runs("u1", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_query_rejected() {
    let f = simple(two_step_plan()).await;
    let err = f
        .orchestrator
        .create_run("u1", "   ", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn test_default_project_created_once() {
    let f = simple(two_step_plan()).await;
    let first = f
        .orchestrator
        .create_run("u1", "research the topic", None)
        .await
        .unwrap();
    let second = f
        .orchestrator
        .create_run("u1", "research it again", None)
        .await
        .unwrap();
    assert_eq!(first.project_id, second.project_id);
    assert_eq!(f.orchestrator.list_projects("u1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_lifecycle_events_are_published() {
    let bus = Arc::new(EventBus::default());
    let mut receiver = bus.subscribe();
    let f = build(
        Arc::new(ScriptedPlanner(plan(vec![PlannedStep::new(
            "gather sources",
            "research",
        )]))),
        Arc::new(OkWorkflow { tokens: 40 }),
        Arc::new(InMemoryExecutorRegistry::new()),
        OrchestratorConfig::default(),
        Some(bus),
    )
    .await;

    let run = f
        .orchestrator
        .create_run("u1", "research the topic", None)
        .await
        .unwrap();
    f.orchestrator.execute_run(run.id).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        kinds.push(match event {
            ActivityEvent::RunCreated { .. } => "run_created",
            ActivityEvent::RunStarted { .. } => "run_started",
            ActivityEvent::StepStarted { .. } => "step_started",
            ActivityEvent::StepCompleted { .. } => "step_completed",
            ActivityEvent::RunTerminated { .. } => "run_terminated",
            _ => "other",
        });
    }
    assert_eq!(
        kinds,
        vec![
            "run_created",
            "run_started",
            "step_started",
            "step_completed",
            "run_terminated"
        ]
    );
}
