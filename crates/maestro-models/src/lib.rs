//! Maestro Models - Budget governance and model tier selection
//!
//! This crate provides the cost/quality decision layer for Maestro:
//! - Pricing: Per-model token pricing tables
//! - Ledger: Per-user daily/monthly spend tracking with hard limits
//! - Failures: Recent failure history per (project, agent) pair
//! - Selector: Multi-factor execution tier selection with audit records

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod failures;
pub mod ledger;
pub mod pricing;
pub mod selector;

pub use failures::FailureHistory;
pub use ledger::{
    BudgetAlert, BudgetAlertLevel, BudgetLedger, BudgetLimits, BudgetPeriod, BudgetStatus,
    UsageReport,
};
pub use pricing::{default_pricing, ModelPricing};
pub use selector::{
    ModelDecision, ModelSelector, ModelTier, SelectionRequest, SelectorConfig, TierPreference,
};
