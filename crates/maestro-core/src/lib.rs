//! Maestro Core - Orchestration Engine
//!
//! This crate provides the core orchestration logic for Maestro:
//! - Types: Run, Task, Step, Approval, and termination records
//! - Orchestrator: the Run/Task lifecycle state machine
//! - Engine: dual-path step execution (workflow engine with direct fallback)
//! - Approval: static and dynamic approval gating
//! - Events: activity event bus for observers
//! - Store: SQLite persistence for all aggregates

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod approval;
pub mod contract;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod orchestrator;
pub mod planner;
pub mod store;
pub mod types;

pub use approval::{
    Approval, ApprovalGate, ApprovalStatus, ApprovalType, HeuristicGate, RiskAssessment, RiskLevel,
};
pub use contract::{AgentContract, AllowlistEnforcer, ContractEnforcer};
pub use engine::{
    AgentExecutor, AgentExecutorRegistry, HttpWorkflowEngine, InMemoryExecutorRegistry, LocalAgent,
    StepEngine, StepEngineConfig, WorkflowEngine, WorkflowRequest, WorkflowResponse,
};
pub use error::{Error, Result};
pub use events::{ActivityEvent, EventBus};
pub use memory::{ContextProvider, NoContext};
pub use orchestrator::{Orchestrator, OrchestratorConfig, TaskOutcome};
pub use planner::{Plan, PlannedStep, Planner};
pub use store::Store;
pub use types::{
    LibraryEntry, Project, Run, RunStatus, StepResult, StepStatus, Task, TaskStatus,
    TerminationReason, TerminationRecord, TodoItem,
};
