use chrono::Utc;
use dashmap::DashMap;
use maestro_models::{BudgetAlertLevel, SelectionRequest};
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::core::Orchestrator;
use super::TaskOutcome;
use crate::approval::{Approval, ApprovalType, RiskLevel};
use crate::error::{Error, Result};
use crate::events::ActivityEvent;
use crate::types::{
    Run, RunStatus, StepResult, StepStatus, Task, TaskStatus, TerminationReason,
    TerminationRecord,
};

/// Removes the run from the active set when execution leaves scope
struct RunGuard<'a> {
    runs: &'a DashMap<Uuid, ()>,
    id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runs.remove(&self.id);
    }
}

impl Orchestrator {
    /// Drive a run to suspension or termination.
    ///
    /// Idempotent over terminated runs. A second concurrent call for the
    /// same run is rejected rather than queued.
    #[instrument(skip(self))]
    pub async fn execute_run(&self, run_id: Uuid) -> Result<()> {
        let mut run = self.get_run(run_id).await?;
        if run.is_terminated() {
            info!(%run_id, "Run already terminated, nothing to execute");
            return Ok(());
        }

        if self.active_runs.insert(run_id, ()).is_some() {
            return Err(Error::InvalidInput(format!(
                "run {run_id} is already executing"
            )));
        }
        let _guard = RunGuard {
            runs: &self.active_runs,
            id: run_id,
        };

        let mut task = self.get_task(run.task_id).await?;

        run.status = RunStatus::Executing;
        if run.started_at.is_none() {
            run.started_at = Some(Utc::now());
        }
        self.store.update_run(&run).await?;
        self.emit(ActivityEvent::RunStarted {
            run_id: run.id,
            task_id: task.id,
        });

        if task.status != TaskStatus::Executing {
            task.status = TaskStatus::Executing;
            self.store.update_task(&mut task).await?;
        }

        let outcome = match self.execute_task(&mut run, &mut task).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%run_id, error = %e, "Execution loop failed");
                TaskOutcome::Failed {
                    reason: match e {
                        Error::ContractViolation(_) => TerminationReason::ContractViolation,
                        Error::BudgetExhausted(_) => TerminationReason::BudgetExhausted,
                        _ => TerminationReason::AgentError,
                    },
                    details: e.to_string(),
                }
            }
        };

        match outcome {
            TaskOutcome::Suspended { approval_id } => {
                run.status = RunStatus::WaitingApproval;
                self.store.update_run(&run).await?;
                info!(%run_id, %approval_id, "Run suspended on approval");
                Ok(())
            }
            TaskOutcome::Completed => {
                task.status = TaskStatus::Completed;
                self.store.update_task(&mut task).await?;
                let details = format!("all {} steps completed", task.todo_list.len());
                self.terminate(&mut run, &task, TerminationReason::Completed, details)
                    .await
            }
            TaskOutcome::Failed { reason, details } => {
                if task.status != TaskStatus::Failed {
                    task.status = TaskStatus::Failed;
                    self.store.update_task(&mut task).await?;
                }
                self.terminate(&mut run, &task, reason, details).await
            }
        }
    }

    /// Terminal transition: status, timestamps, and the one-shot
    /// termination record.
    pub(super) async fn terminate(
        &self,
        run: &mut Run,
        task: &Task,
        reason: TerminationReason,
        details: String,
    ) -> Result<()> {
        let ended_at = Utc::now();
        run.status = RunStatus::Terminated;
        run.terminated_at = Some(ended_at);
        run.termination_reason = Some(reason);
        run.termination_details = Some(details.clone());
        run.total_tokens = task.total_tokens;

        let last_step = task
            .todo_list
            .iter()
            .filter(|s| s.status != StepStatus::Pending)
            .last();

        let record = TerminationRecord {
            run_id: run.id,
            reason,
            details: details.clone(),
            last_step_id: last_step.map(|s| s.id.clone()),
            last_agent_type: last_step.map(|s| s.agent_type.clone()),
            steps_planned: task.todo_list.len(),
            steps_completed: task.steps_completed.len(),
            total_tokens: task.total_tokens,
            total_duration_ms: run.total_duration_ms,
            started_at: run.started_at,
            ended_at,
        };
        self.store.insert_termination(&record).await?;
        self.store.update_run(run).await?;

        info!(run_id = %run.id, reason = reason.as_str(), "Run terminated");
        self.emit(ActivityEvent::RunTerminated {
            run_id: run.id,
            task_id: task.id,
            reason,
            details,
        });
        Ok(())
    }

    /// The multi-pass step loop.
    ///
    /// Each pass dispatches every step whose dependencies are met, in plan
    /// order. A pass that completes nothing while steps remain means the
    /// dependency graph cannot make progress, which fails the task instead
    /// of spinning.
    async fn execute_task(&self, run: &mut Run, task: &mut Task) -> Result<TaskOutcome> {
        loop {
            let mut progressed = false;
            let ready: Vec<String> = task
                .todo_list
                .iter()
                .filter(|s| !task.is_step_completed(&s.id))
                .map(|s| s.id.clone())
                .collect();

            for step_id in ready {
                let step = match task.todo_list.iter().find(|s| s.id == step_id) {
                    Some(s) => s.clone(),
                    None => continue,
                };
                if task.is_step_completed(&step.id) || !task.dependencies_met(&step) {
                    continue;
                }

                if task.total_invocations >= self.config.max_step_invocations {
                    let details = format!(
                        "invocation budget exhausted ({} dispatches)",
                        task.total_invocations
                    );
                    self.fail_step(run, task, &step.id, &details).await?;
                    return Ok(TaskOutcome::Failed {
                        reason: TerminationReason::BudgetExhausted,
                        details,
                    });
                }

                // token hard stop applies before dispatch; tokens spent
                // before a suspension still count against the ceiling
                if task.total_tokens >= self.config.max_task_tokens {
                    let details = format!(
                        "token budget exhausted ({} of {} tokens)",
                        task.total_tokens, self.config.max_task_tokens
                    );
                    self.fail_step(run, task, &step.id, &details).await?;
                    return Ok(TaskOutcome::Failed {
                        reason: TerminationReason::BudgetExhausted,
                        details,
                    });
                }

                // planner-declared gate: suspend before the step runs
                if step.require_approval && step.status == StepStatus::Pending {
                    let approval_id = self
                        .suspend_on_approval(run, task, &step.id, ApprovalType::StaticGate, RiskLevel::Medium)
                        .await?;
                    return Ok(TaskOutcome::Suspended { approval_id });
                }

                let decision = self
                    .selector
                    .select(&SelectionRequest {
                        task_id: task.id,
                        project_id: task.project_id.clone(),
                        agent_type: step.agent_type.clone(),
                        query: task.query.clone(),
                        plan_steps: task.todo_list.len(),
                        user_id: task.user_id.clone(),
                        preference: self.config.tier_preference,
                        max_cost_per_request: self.config.max_cost_per_request,
                    })
                    .await;

                if let Some(s) = task.step_mut(&step.id) {
                    s.status = StepStatus::InProgress;
                }
                task.total_invocations += 1;
                self.store.update_task(task).await?;
                self.emit(ActivityEvent::StepStarted {
                    run_id: run.id,
                    step_id: step.id.clone(),
                    agent_type: step.agent_type.clone(),
                    model: decision.model.clone(),
                });

                let result = match self.engine.execute(run, task, &step, &decision.model).await {
                    Ok(result) => result,
                    Err(e) => {
                        self.failures.record(&task.project_id, &step.agent_type).await;
                        self.fail_step(run, task, &step.id, &e.to_string()).await?;
                        let reason = match e {
                            Error::ContractViolation(_) => TerminationReason::ContractViolation,
                            _ => TerminationReason::AgentError,
                        };
                        return Ok(TaskOutcome::Failed {
                            reason,
                            details: format!("step {} failed: {e}", step.id),
                        });
                    }
                };

                let result = match result {
                    StepResult::Failure { reason } => {
                        self.failures.record(&task.project_id, &step.agent_type).await;
                        self.fail_step(run, task, &step.id, &reason).await?;
                        return Ok(TaskOutcome::Failed {
                            reason: TerminationReason::AgentError,
                            details: format!("step {} failed: {reason}", step.id),
                        });
                    }
                    success => success,
                };

                let tokens = result.tokens_used();
                let duration_ms = match &result {
                    StepResult::Success { duration_ms, .. } => *duration_ms,
                    StepResult::Failure { .. } => 0,
                };
                task.total_tokens += u64::from(tokens);
                run.total_tokens = task.total_tokens;
                run.total_duration_ms += duration_ms;

                for alert in self
                    .ledger
                    .track_usage(&task.user_id, &decision.model, tokens)
                    .await
                {
                    if alert.level == BudgetAlertLevel::Warning {
                        self.emit(ActivityEvent::BudgetWarning {
                            user_id: alert.user_id.clone(),
                            period: alert.period.as_str().to_string(),
                            spent_usd: alert.spent_usd,
                            limit_usd: alert.limit_usd,
                        });
                    }
                }

                let assessment = self.gate.assess(&step, &result).await;

                if let Some(s) = task.step_mut(&step.id) {
                    s.status = StepStatus::Completed;
                    s.result = Some(result);
                }

                // result recorded, but completion deferred to the approval
                if assessment.required && !assessment.auto_approvable {
                    let approval_id = self
                        .suspend_on_approval(
                            run,
                            task,
                            &step.id,
                            ApprovalType::DynamicRisk,
                            assessment.level,
                        )
                        .await?;
                    return Ok(TaskOutcome::Suspended { approval_id });
                }

                task.record_completed(&step.id);
                self.store.update_task(task).await?;
                self.store.update_run(run).await?;
                self.emit(ActivityEvent::StepCompleted {
                    run_id: run.id,
                    step_id: step.id.clone(),
                    success: true,
                    tokens_used: tokens,
                    duration_ms,
                });
                progressed = true;
            }

            if task.all_steps_completed() {
                return Ok(TaskOutcome::Completed);
            }
            if !progressed {
                let blocked: Vec<&str> = task
                    .todo_list
                    .iter()
                    .filter(|s| !task.is_step_completed(&s.id))
                    .map(|s| s.id.as_str())
                    .collect();
                return Ok(TaskOutcome::Failed {
                    reason: TerminationReason::AgentError,
                    details: format!(
                        "no step can make progress; blocked: {}",
                        blocked.join(", ")
                    ),
                });
            }
        }
    }

    /// Record a step failure on the task
    async fn fail_step(
        &self,
        run: &Run,
        task: &mut Task,
        step_id: &str,
        error: &str,
    ) -> Result<()> {
        if let Some(s) = task.step_mut(step_id) {
            s.status = StepStatus::Failed;
            s.error = Some(error.to_string());
        }
        task.status = TaskStatus::Failed;
        self.store.update_task(task).await?;
        self.emit(ActivityEvent::StepCompleted {
            run_id: run.id,
            step_id: step_id.to_string(),
            success: false,
            tokens_used: 0,
            duration_ms: 0,
        });
        Ok(())
    }

    /// Create the pending approval and park the task
    async fn suspend_on_approval(
        &self,
        run: &Run,
        task: &mut Task,
        step_id: &str,
        approval_type: ApprovalType,
        risk_level: RiskLevel,
    ) -> Result<Uuid> {
        let description = task
            .todo_list
            .iter()
            .find(|s| s.id == step_id)
            .map(|s| s.description.clone())
            .unwrap_or_default();

        let approval = Approval::new(
            run.id,
            task.id,
            task.project_id.clone(),
            step_id,
            task.user_id.clone(),
            approval_type,
            description,
            risk_level,
        );
        self.store.create_approval(&approval).await?;

        task.status = TaskStatus::ApprovalNeeded;
        self.store.update_task(task).await?;

        self.emit(ActivityEvent::ApprovalRequested {
            run_id: run.id,
            approval_id: approval.id,
            step_id: step_id.to_string(),
            risk_level,
        });
        Ok(approval.id)
    }

    /// Apply a user's decision to a pending approval.
    ///
    /// Approving resumes the suspended run in the background; rejecting
    /// terminates it. A second response to the same approval is rejected.
    #[instrument(skip(self))]
    pub async fn respond_to_approval(
        self: std::sync::Arc<Self>,
        approval_id: Uuid,
        approved: bool,
        notes: Option<String>,
    ) -> Result<Approval> {
        let mut approval = self.get_approval(approval_id).await?;
        if !approval.resolve(approved, notes) {
            return Err(Error::InvalidInput(format!(
                "approval {approval_id} is already resolved"
            )));
        }
        self.store.update_approval(&approval).await?;
        self.emit(ActivityEvent::ApprovalResolved {
            approval_id: approval.id,
            run_id: approval.run_id,
            approved,
        });

        let mut task = self.get_task(approval.task_id).await?;
        let mut run = self.get_run(approval.run_id).await?;

        if !approved {
            if let Some(s) = task.step_mut(&approval.step_id) {
                s.status = StepStatus::Failed;
                s.error = Some("rejected by user".to_string());
            }
            task.status = TaskStatus::Failed;
            self.store.update_task(&mut task).await?;
            self.terminate(
                &mut run,
                &task,
                TerminationReason::ApprovalRejected,
                format!("step {} rejected by user", approval.step_id),
            )
            .await?;
            return Ok(approval);
        }

        if let Some(s) = task.step_mut(&approval.step_id) {
            s.status = StepStatus::Completed;
            // a statically-gated step never ran; stand in a marker result
            if s.result.is_none() {
                s.result = Some(StepResult::Success {
                    outputs: HashMap::from([(
                        "approved".to_string(),
                        serde_json::json!(true),
                    )]),
                    artifact_ids: Vec::new(),
                    tokens_used: 0,
                    duration_ms: 0,
                    model_used: None,
                    workflow_error: None,
                });
            }
        }
        task.record_completed(&approval.step_id);
        task.status = TaskStatus::Executing;
        self.store.update_task(&mut task).await?;

        run.status = RunStatus::Executing;
        self.store.update_run(&run).await?;

        let orchestrator = std::sync::Arc::clone(&self);
        let run_id = approval.run_id;
        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute_run(run_id).await {
                warn!(%run_id, error = %e, "Resumed run failed to execute");
            }
        });

        Ok(approval)
    }
}
