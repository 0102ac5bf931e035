//! Failure History - recent failures per (project, agent) pair
//!
//! The tier selector escalates to cloud execution when an agent keeps
//! failing inside a project. This tracker records failure timestamps and
//! answers windowed counts, pruning anything past the retention horizon.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Days a failure record is retained before pruning
const RETENTION_DAYS: i64 = 30;

/// Thread-safe failure history keyed by (project, agent)
#[derive(Debug, Default)]
pub struct FailureHistory {
    entries: RwLock<HashMap<(String, String), Vec<DateTime<Utc>>>>,
}

impl FailureHistory {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure for an agent inside a project
    pub async fn record(&self, project_id: &str, agent_type: &str) {
        let now = Utc::now();
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let mut entries = self.entries.write().await;
        let timestamps = entries
            .entry((project_id.to_string(), agent_type.to_string()))
            .or_default();
        timestamps.retain(|t| *t >= cutoff);
        timestamps.push(now);
    }

    /// Count failures for the pair within the lookback window
    pub async fn recent(&self, project_id: &str, agent_type: &str, lookback_days: i64) -> usize {
        let cutoff = Utc::now() - Duration::days(lookback_days);
        let entries = self.entries.read().await;
        entries
            .get(&(project_id.to_string(), agent_type.to_string()))
            .map_or(0, |ts| ts.iter().filter(|t| **t >= cutoff).count())
    }
}
