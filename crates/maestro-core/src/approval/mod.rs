//! Approval gating
//!
//! Two independent trigger points gate step execution: a static
//! planner-assigned `require_approval` flag checked before a step runs,
//! and a dynamic risk assessment applied to a step's result after it
//! runs. Either creates an `Approval` record and suspends the Run until a
//! human responds.

mod gate;
mod types;


pub use gate::{ApprovalGate, HeuristicGate, RiskAssessment};
pub use types::{Approval, ApprovalPreview, ApprovalStatus, ApprovalType, RiskLevel};
