//! Budget Ledger - per-user spend tracking and quota enforcement
//!
//! Tracks per-model spend in two rolling windows (daily and monthly) per
//! user. A `warning` threshold (default 80% of the limit) produces alert
//! records for the caller to publish; the `limit` threshold (100%) is a
//! hard stop surfaced through `can_use_cloud` / `can_afford` — never an
//! error. Window entries expire automatically: daily keys after 7 days,
//! monthly keys after 60 days.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use utoipa::ToSchema;

use crate::pricing::{estimate_cost, ModelPricing};

/// Days a daily window entry is retained before expiry
const DAILY_RETENTION_DAYS: i64 = 7;

/// Days a monthly window entry is retained before expiry
const MONTHLY_RETENTION_DAYS: i64 = 60;

/// Spend limits for one user (applied uniformly to all users)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetLimits {
    /// Maximum daily spend (USD)
    pub daily_limit_usd: f64,
    /// Maximum monthly spend (USD)
    pub monthly_limit_usd: f64,
    /// Fraction of a limit at which a warning alert fires
    pub warning_ratio: f64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            daily_limit_usd: 10.0,
            monthly_limit_usd: 100.0,
            warning_ratio: 0.8,
        }
    }
}

/// Which rolling window an alert refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    /// Per-day window
    Daily,
    /// Per-calendar-month window
    Monthly,
}

impl BudgetPeriod {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

/// Severity of a budget alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BudgetAlertLevel {
    /// Spend crossed the warning threshold (default 80%)
    Warning,
    /// Spend reached the hard limit
    LimitReached,
}

/// Alert produced when tracked spend crosses a threshold
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BudgetAlert {
    /// User whose budget crossed the threshold
    pub user_id: String,
    /// Window the threshold belongs to
    pub period: BudgetPeriod,
    /// Alert severity
    pub level: BudgetAlertLevel,
    /// Spend after the tracked usage (USD)
    pub spent_usd: f64,
    /// The configured limit (USD)
    pub limit_usd: f64,
}

/// Current budget position for one user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BudgetStatus {
    /// User this status describes
    pub user_id: String,
    /// Spend in the current daily window (USD)
    pub daily_spent_usd: f64,
    /// Daily limit (USD)
    pub daily_limit_usd: f64,
    /// Spend in the current monthly window (USD)
    pub monthly_spent_usd: f64,
    /// Monthly limit (USD)
    pub monthly_limit_usd: f64,
    /// Daily spend is at or past the warning threshold
    pub daily_warning: bool,
    /// Monthly spend is at or past the warning threshold
    pub monthly_warning: bool,
    /// Cloud-tier selection is still permitted
    pub can_use_cloud: bool,
}

/// Per-model spend breakdown for one user
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UsageReport {
    /// User this report describes
    pub user_id: String,
    /// Current-day spend per model (USD)
    pub daily_by_model: HashMap<String, f64>,
    /// Current-month spend per model (USD)
    pub monthly_by_model: HashMap<String, f64>,
    /// Current-day total (USD)
    pub daily_total_usd: f64,
    /// Current-month total (USD)
    pub monthly_total_usd: f64,
}

/// One window entry: per-model spend plus a running total
#[derive(Debug, Clone, Default)]
struct SpendEntry {
    by_model: HashMap<String, f64>,
    total: f64,
    recorded_at: DateTime<Utc>,
}

impl SpendEntry {
    fn add(&mut self, model: &str, cost: f64, now: DateTime<Utc>) {
        *self.by_model.entry(model.to_string()).or_insert(0.0) += cost;
        self.total += cost;
        self.recorded_at = now;
    }
}

/// Both rolling windows for one user, keyed by date string
#[derive(Debug, Default)]
struct UserSpend {
    /// Keyed by `YYYY-MM-DD`
    daily: HashMap<String, SpendEntry>,
    /// Keyed by `YYYY-MM`
    monthly: HashMap<String, SpendEntry>,
}

/// Thread-safe per-user budget ledger
#[derive(Debug)]
pub struct BudgetLedger {
    limits: BudgetLimits,
    pricing: HashMap<String, ModelPricing>,
    spend: RwLock<HashMap<String, UserSpend>>,
}

impl Default for BudgetLedger {
    fn default() -> Self {
        Self::new(BudgetLimits::default(), crate::pricing::default_pricing())
    }
}

fn daily_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

fn monthly_key(now: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", now.year(), now.month())
}

impl BudgetLedger {
    /// Create a ledger with the given limits and pricing table
    #[must_use]
    pub fn new(limits: BudgetLimits, pricing: HashMap<String, ModelPricing>) -> Self {
        Self {
            limits,
            pricing,
            spend: RwLock::new(HashMap::new()),
        }
    }

    /// The configured limits
    #[must_use]
    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    /// Estimate the cost of a call against this ledger's pricing table
    #[must_use]
    pub fn estimate(&self, model: &str, total_tokens: u32) -> f64 {
        estimate_cost(&self.pricing, model, total_tokens)
    }

    /// Record token usage for a user and model.
    ///
    /// No-op for zero-cost (local) models. Returns the threshold crossings
    /// this usage caused, in window order (daily first), so the caller can
    /// publish alerts.
    pub async fn track_usage(&self, user_id: &str, model: &str, tokens: u32) -> Vec<BudgetAlert> {
        if let Some(p) = self.pricing.get(model) {
            if p.is_free() {
                return Vec::new();
            }
        }
        let cost = self.estimate(model, tokens);
        if cost <= 0.0 {
            return Vec::new();
        }

        let now = Utc::now();
        let mut spend = self.spend.write().await;
        let user = spend.entry(user_id.to_string()).or_default();

        Self::prune(user, now);

        let daily = user.daily.entry(daily_key(now)).or_default();
        let daily_before = daily.total;
        daily.add(model, cost, now);
        let daily_after = daily.total;

        let monthly = user.monthly.entry(monthly_key(now)).or_default();
        let monthly_before = monthly.total;
        monthly.add(model, cost, now);
        let monthly_after = monthly.total;

        debug!(
            user_id,
            model,
            tokens,
            cost_usd = cost,
            daily_total = daily_after,
            monthly_total = monthly_after,
            "Tracked usage"
        );

        let mut alerts = Vec::new();
        self.detect_crossings(
            &mut alerts,
            user_id,
            BudgetPeriod::Daily,
            daily_before,
            daily_after,
            self.limits.daily_limit_usd,
        );
        self.detect_crossings(
            &mut alerts,
            user_id,
            BudgetPeriod::Monthly,
            monthly_before,
            monthly_after,
            self.limits.monthly_limit_usd,
        );
        alerts
    }

    fn detect_crossings(
        &self,
        alerts: &mut Vec<BudgetAlert>,
        user_id: &str,
        period: BudgetPeriod,
        before: f64,
        after: f64,
        limit: f64,
    ) {
        let warning_at = limit * self.limits.warning_ratio;
        if before < warning_at && after >= warning_at {
            alerts.push(BudgetAlert {
                user_id: user_id.to_string(),
                period,
                level: BudgetAlertLevel::Warning,
                spent_usd: after,
                limit_usd: limit,
            });
        }
        if before < limit && after >= limit {
            alerts.push(BudgetAlert {
                user_id: user_id.to_string(),
                period,
                level: BudgetAlertLevel::LimitReached,
                spent_usd: after,
                limit_usd: limit,
            });
        }
    }

    /// Drop window entries past their retention horizon
    fn prune(user: &mut UserSpend, now: DateTime<Utc>) {
        let daily_cutoff = now - Duration::days(DAILY_RETENTION_DAYS);
        let monthly_cutoff = now - Duration::days(MONTHLY_RETENTION_DAYS);
        user.daily.retain(|_, e| e.recorded_at >= daily_cutoff);
        user.monthly.retain(|_, e| e.recorded_at >= monthly_cutoff);
    }

    async fn current_totals(&self, user_id: &str) -> (f64, f64) {
        let now = Utc::now();
        let spend = self.spend.read().await;
        match spend.get(user_id) {
            Some(user) => (
                user.daily.get(&daily_key(now)).map_or(0.0, |e| e.total),
                user.monthly.get(&monthly_key(now)).map_or(0.0, |e| e.total),
            ),
            None => (0.0, 0.0),
        }
    }

    /// Current budget position for a user
    pub async fn status(&self, user_id: &str) -> BudgetStatus {
        let (daily, monthly) = self.current_totals(user_id).await;
        let limits = &self.limits;
        BudgetStatus {
            user_id: user_id.to_string(),
            daily_spent_usd: daily,
            daily_limit_usd: limits.daily_limit_usd,
            monthly_spent_usd: monthly,
            monthly_limit_usd: limits.monthly_limit_usd,
            daily_warning: daily >= limits.daily_limit_usd * limits.warning_ratio,
            monthly_warning: monthly >= limits.monthly_limit_usd * limits.warning_ratio,
            can_use_cloud: daily < limits.daily_limit_usd && monthly < limits.monthly_limit_usd,
        }
    }

    /// Whether a user can afford an estimated spend without breaching any
    /// limit. `max_cost_per_request` is an optional caller-supplied per-call
    /// ceiling. Never errors; an over-budget user simply gets `false`.
    pub async fn can_afford(
        &self,
        user_id: &str,
        estimated_cost: f64,
        max_cost_per_request: Option<f64>,
    ) -> bool {
        if let Some(ceiling) = max_cost_per_request {
            if estimated_cost > ceiling {
                return false;
            }
        }
        let (daily, monthly) = self.current_totals(user_id).await;
        daily + estimated_cost <= self.limits.daily_limit_usd
            && monthly + estimated_cost <= self.limits.monthly_limit_usd
    }

    /// Per-model spend breakdown for the current windows
    pub async fn usage_report(&self, user_id: &str) -> UsageReport {
        let now = Utc::now();
        let spend = self.spend.read().await;
        let mut report = UsageReport {
            user_id: user_id.to_string(),
            ..Default::default()
        };
        if let Some(user) = spend.get(user_id) {
            if let Some(entry) = user.daily.get(&daily_key(now)) {
                report.daily_by_model = entry.by_model.clone();
                report.daily_total_usd = entry.total;
            }
            if let Some(entry) = user.monthly.get(&monthly_key(now)) {
                report.monthly_by_model = entry.by_model.clone();
                report.monthly_total_usd = entry.total;
            }
        }
        report
    }
}
