//! Model Tier Selector - cost/quality decision policy
//!
//! Selects an execution tier per step from four ordered tiers. The
//! pipeline runs in a fixed order and only escalates, except for the two
//! explicit downgrades (user `prefer_local` and cloud unaffordability):
//!
//! 1. Start at `tier1_fast`.
//! 2. Complexity score over the query and plan; score > threshold
//!    escalates to `tier3_quality`.
//! 3. Recent failures for the (project, agent) pair past the threshold
//!    force `tier4_cloud` — this escalation can never be overridden.
//! 4. User preference: `prefer_cloud` forces cloud; `prefer_local`
//!    downgrades cloud to `tier3_quality` unless failures forced it.
//! 5. Cloud affordability check against the budget ledger; unaffordable
//!    downgrades to `tier3_quality`.
//! 6. Emit the fallback chain and reasoning trail; persist the decision
//!    keyed by task id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::failures::FailureHistory;
use crate::ledger::BudgetLedger;

/// Keywords that suggest code-related work (+1 complexity)
const CODE_KEYWORDS: &[&str] = &[
    "code", "implement", "function", "refactor", "debug", "api", "bug", "test",
];

/// Keywords that suggest analysis/design work (+2 complexity)
const ANALYSIS_KEYWORDS: &[&str] = &[
    "analyze", "analysis", "design", "architect", "architecture", "evaluate", "compare",
];

/// Execution quality tier, ordered cheapest to most capable
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Small local model, lowest latency
    Tier1Fast,
    /// Mid-size local model
    Tier2Balanced,
    /// Large local model
    Tier3Quality,
    /// Paid cloud model
    Tier4Cloud,
}

impl ModelTier {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tier1Fast => "tier1_fast",
            Self::Tier2Balanced => "tier2_balanced",
            Self::Tier3Quality => "tier3_quality",
            Self::Tier4Cloud => "tier4_cloud",
        }
    }
}

/// Explicit user preference applied at stage 4
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierPreference {
    /// No preference; the pipeline decides
    #[default]
    None,
    /// Keep execution on local tiers when possible
    PreferLocal,
    /// Always use the cloud tier
    PreferCloud,
}

/// Selector tuning knobs
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Complexity score above which tier3 is selected
    pub complexity_threshold: u8,
    /// Failure count above which cloud is forced
    pub failure_threshold: usize,
    /// Failure lookback window in days
    pub failure_lookback_days: i64,
    /// Token estimate used for cloud affordability checks
    pub estimated_tokens: u32,
    /// Model used for `tier1_fast`
    pub tier1_model: String,
    /// Model used for `tier2_balanced`
    pub tier2_model: String,
    /// Model used for `tier3_quality`
    pub tier3_model: String,
    /// Cloud model used when no per-agent default applies
    pub cloud_default_model: String,
    /// Per-agent cloud model defaults
    pub agent_cloud_models: HashMap<String, String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 6,
            failure_threshold: 2,
            failure_lookback_days: 7,
            estimated_tokens: 4_000,
            tier1_model: "llama3.2".to_string(),
            tier2_model: "qwen2.5-14b".to_string(),
            tier3_model: "qwen2.5-32b".to_string(),
            cloud_default_model: "claude-3-5-sonnet-20241022".to_string(),
            agent_cloud_models: HashMap::from([
                ("coding".to_string(), "claude-3-5-sonnet-20241022".to_string()),
                ("research".to_string(), "gpt-4o".to_string()),
                ("analysis".to_string(), "claude-3-opus-20240229".to_string()),
            ]),
        }
    }
}

/// Everything the selector needs to know about one step
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    /// Task the step belongs to (audit key)
    pub task_id: Uuid,
    /// Project the task belongs to
    pub project_id: String,
    /// Target agent type for the step
    pub agent_type: String,
    /// Original user query
    pub query: String,
    /// Number of steps in the plan
    pub plan_steps: usize,
    /// User the spend is attributed to
    pub user_id: String,
    /// Explicit user preference
    pub preference: TierPreference,
    /// Optional per-request cost ceiling (USD)
    pub max_cost_per_request: Option<f64>,
}

/// Audit record for one tier selection
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelDecision {
    /// Task the decision belongs to
    pub task_id: Uuid,
    /// Agent type the step targets
    pub agent_type: String,
    /// Selected model id
    pub model: String,
    /// Selected tier
    pub tier: ModelTier,
    /// Ordered human-readable reasoning trail
    pub reasoning: Vec<String>,
    /// Estimated cost of the call (USD, zero for local tiers)
    pub estimated_cost_usd: f64,
    /// Progressively cheaper models to retry with on failure
    pub fallback_chain: Vec<String>,
    /// When the decision was made
    pub decided_at: DateTime<Utc>,
}

/// Stateless decision function over task attributes, ledger state, and
/// failure history. Holds only the audit map of past decisions.
pub struct ModelSelector {
    ledger: Arc<BudgetLedger>,
    failures: Arc<FailureHistory>,
    config: SelectorConfig,
    decisions: RwLock<HashMap<Uuid, ModelDecision>>,
}

impl ModelSelector {
    /// Create a selector over the given ledger and failure history
    #[must_use]
    pub fn new(
        ledger: Arc<BudgetLedger>,
        failures: Arc<FailureHistory>,
        config: SelectorConfig,
    ) -> Self {
        Self {
            ledger,
            failures,
            config,
            decisions: RwLock::new(HashMap::new()),
        }
    }

    /// Compute the complexity score for a query/plan (3..=10)
    #[must_use]
    pub fn complexity_score(query: &str, plan_steps: usize) -> u8 {
        let lower = query.to_lowercase();
        let mut score: u8 = 3;
        if query.len() > 500 {
            score += 2;
        }
        if CODE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            score += 1;
        }
        if ANALYSIS_KEYWORDS.iter().any(|k| lower.contains(k)) {
            score += 2;
        }
        if plan_steps > 3 {
            score += 1;
        }
        score.min(10)
    }

    fn model_for_tier(&self, tier: ModelTier, agent_type: &str) -> String {
        match tier {
            ModelTier::Tier1Fast => self.config.tier1_model.clone(),
            ModelTier::Tier2Balanced => self.config.tier2_model.clone(),
            ModelTier::Tier3Quality => self.config.tier3_model.clone(),
            ModelTier::Tier4Cloud => self
                .config
                .agent_cloud_models
                .get(agent_type)
                .cloned()
                .unwrap_or_else(|| self.config.cloud_default_model.clone()),
        }
    }

    fn fallback_chain(&self, tier: ModelTier, agent_type: &str) -> Vec<String> {
        let all = [
            ModelTier::Tier4Cloud,
            ModelTier::Tier3Quality,
            ModelTier::Tier2Balanced,
            ModelTier::Tier1Fast,
        ];
        all.iter()
            .filter(|t| **t < tier)
            .rev()
            .map(|t| self.model_for_tier(*t, agent_type))
            .collect()
    }

    /// Run the selection pipeline for one step and persist the decision
    #[instrument(skip(self, request), fields(task_id = %request.task_id, agent = %request.agent_type))]
    pub async fn select(&self, request: &SelectionRequest) -> ModelDecision {
        let mut reasoning = Vec::new();
        let mut tier = ModelTier::Tier1Fast;
        reasoning.push("starting at tier1_fast".to_string());

        // Stage 2: complexity
        let score = Self::complexity_score(&request.query, request.plan_steps);
        if score > self.config.complexity_threshold {
            tier = ModelTier::Tier3Quality;
            reasoning.push(format!(
                "complexity score {} > {}, escalating to tier3_quality",
                score, self.config.complexity_threshold
            ));
        } else {
            reasoning.push(format!("complexity score {} within threshold", score));
        }

        // Stage 3: failure history (never overridden once it forces cloud)
        let failure_count = self
            .failures
            .recent(
                &request.project_id,
                &request.agent_type,
                self.config.failure_lookback_days,
            )
            .await;
        let failure_forced = failure_count > self.config.failure_threshold;
        if failure_forced {
            tier = ModelTier::Tier4Cloud;
            reasoning.push(format!(
                "{} recent failures for agent '{}' (> {}), forcing tier4_cloud",
                failure_count, request.agent_type, self.config.failure_threshold
            ));
        }

        // Stage 4: user preference
        match request.preference {
            TierPreference::PreferCloud => {
                if tier != ModelTier::Tier4Cloud {
                    tier = ModelTier::Tier4Cloud;
                    reasoning.push("user prefers cloud, escalating to tier4_cloud".to_string());
                }
            }
            TierPreference::PreferLocal => {
                if tier == ModelTier::Tier4Cloud && !failure_forced {
                    tier = ModelTier::Tier3Quality;
                    reasoning.push("user prefers local, downgrading to tier3_quality".to_string());
                } else if failure_forced {
                    reasoning.push(
                        "user prefers local but failure escalation takes precedence".to_string(),
                    );
                }
            }
            TierPreference::None => {}
        }

        // Stage 5: cloud affordability
        let mut estimated_cost = 0.0;
        if tier == ModelTier::Tier4Cloud {
            let model = self.model_for_tier(tier, &request.agent_type);
            estimated_cost = self.ledger.estimate(&model, self.config.estimated_tokens);
            let affordable = self
                .ledger
                .can_afford(&request.user_id, estimated_cost, request.max_cost_per_request)
                .await;
            if affordable {
                reasoning.push(format!(
                    "cloud call affordable (estimated ${estimated_cost:.4})"
                ));
            } else {
                reasoning.push(format!(
                    "cloud budget exhausted or over ceiling (estimated ${estimated_cost:.4}), downgrading to tier3_quality"
                ));
                tier = ModelTier::Tier3Quality;
                estimated_cost = 0.0;
            }
        }

        let model = self.model_for_tier(tier, &request.agent_type);
        let fallback_chain = self.fallback_chain(tier, &request.agent_type);
        reasoning.push(format!("selected {} ({})", model, tier.as_str()));

        let decision = ModelDecision {
            task_id: request.task_id,
            agent_type: request.agent_type.clone(),
            model,
            tier,
            reasoning,
            estimated_cost_usd: estimated_cost,
            fallback_chain,
            decided_at: Utc::now(),
        };

        debug!(model = %decision.model, tier = decision.tier.as_str(), "Model selected");

        let mut decisions = self.decisions.write().await;
        decisions.insert(request.task_id, decision.clone());
        decision
    }

    /// Fetch the persisted decision for a task, if any
    pub async fn decision_for(&self, task_id: Uuid) -> Option<ModelDecision> {
        let decisions = self.decisions.read().await;
        decisions.get(&task_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BudgetLimits;

    fn selector() -> ModelSelector {
        let ledger = Arc::new(BudgetLedger::default());
        let failures = Arc::new(FailureHistory::new());
        ModelSelector::new(ledger, failures, SelectorConfig::default())
    }

    fn request(query: &str) -> SelectionRequest {
        SelectionRequest {
            task_id: Uuid::new_v4(),
            project_id: "p1".to_string(),
            agent_type: "coding".to_string(),
            query: query.to_string(),
            plan_steps: 2,
            user_id: "u1".to_string(),
            preference: TierPreference::None,
            max_cost_per_request: None,
        }
    }

    #[test]
    fn test_complexity_score_caps_at_ten() {
        let long_query = format!("{} analyze and implement the design", "x".repeat(600));
        let score = ModelSelector::complexity_score(&long_query, 5);
        assert_eq!(score, 9);
        assert!(ModelSelector::complexity_score(&long_query.repeat(3), 10) <= 10);
    }

    #[tokio::test]
    async fn test_simple_query_stays_on_tier1() {
        let selector = selector();
        let decision = selector.select(&request("what time is it")).await;
        assert_eq!(decision.tier, ModelTier::Tier1Fast);
        assert!(decision.fallback_chain.is_empty());
    }

    #[tokio::test]
    async fn test_complex_query_escalates_to_tier3() {
        let selector = selector();
        let query = format!("{} please analyze the architecture", "details ".repeat(80));
        let decision = selector.select(&request(&query)).await;
        assert_eq!(decision.tier, ModelTier::Tier3Quality);
        // tier3 falls back through tier2 then tier1
        assert_eq!(
            decision.fallback_chain,
            vec!["qwen2.5-14b".to_string(), "llama3.2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failures_force_cloud_despite_prefer_local() {
        let ledger = Arc::new(BudgetLedger::default());
        let failures = Arc::new(FailureHistory::new());
        for _ in 0..3 {
            failures.record("p1", "coding").await;
        }
        let selector = ModelSelector::new(ledger, failures, SelectorConfig::default());

        let query = format!("{} implement the feature", "x".repeat(600));
        let mut req = request(&query);
        req.preference = TierPreference::PreferLocal;

        let decision = selector.select(&req).await;
        assert_eq!(decision.tier, ModelTier::Tier4Cloud);
        assert_eq!(decision.model, "claude-3-5-sonnet-20241022");
        assert!(decision
            .reasoning
            .iter()
            .any(|r| r.contains("failure escalation takes precedence")));
    }

    #[tokio::test]
    async fn test_prefer_cloud_forces_tier4() {
        let selector = selector();
        let mut req = request("quick question");
        req.preference = TierPreference::PreferCloud;
        let decision = selector.select(&req).await;
        assert_eq!(decision.tier, ModelTier::Tier4Cloud);
        assert_eq!(decision.fallback_chain.len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_downgrades_cloud() {
        let ledger = Arc::new(BudgetLedger::new(
            BudgetLimits {
                daily_limit_usd: 0.000001,
                ..BudgetLimits::default()
            },
            crate::pricing::default_pricing(),
        ));
        let selector = ModelSelector::new(
            ledger,
            Arc::new(FailureHistory::new()),
            SelectorConfig::default(),
        );
        let mut req = request("hello");
        req.preference = TierPreference::PreferCloud;
        let decision = selector.select(&req).await;
        assert_eq!(decision.tier, ModelTier::Tier3Quality);
    }

    #[tokio::test]
    async fn test_decision_persisted_by_task_id() {
        let selector = selector();
        let req = request("hello");
        let decision = selector.select(&req).await;
        let stored = selector.decision_for(req.task_id).await.unwrap();
        assert_eq!(stored.model, decision.model);
        assert!(!stored.reasoning.is_empty());
    }
}
