//! Server configuration
//!
//! Defaults come from serde; `config/maestro.toml` and `MAESTRO_*`
//! environment variables override them (`MAESTRO_SERVER__PORT=9090`).

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorAppConfig,
}

/// HTTP server binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}

/// SQLite store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "data/maestro.db".to_string()
}

/// External workflow engine endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Base URL; unset disables the workflow tier so every step runs on
    /// the direct executor
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_workflow_timeout")]
    pub timeout_secs: u64,
}

fn default_workflow_timeout() -> u64 {
    120
}

/// Spend limits applied per user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit_usd: f64,
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit_usd: f64,
    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit_usd: default_daily_limit(),
            monthly_limit_usd: default_monthly_limit(),
            warning_ratio: default_warning_ratio(),
        }
    }
}

fn default_daily_limit() -> f64 {
    10.0
}
fn default_monthly_limit() -> f64 {
    100.0
}
fn default_warning_ratio() -> f64 {
    0.8
}

/// Execution loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorAppConfig {
    /// Ceiling on step dispatches per task
    #[serde(default = "default_max_invocations")]
    pub max_step_invocations: u32,
    /// Ceiling on accumulated tokens per task
    #[serde(default = "default_max_tokens")]
    pub max_task_tokens: u64,
    /// Tier preference: "none", "prefer_local", or "prefer_cloud"
    #[serde(default = "default_preference")]
    pub tier_preference: String,
    /// Optional per-request cost ceiling (USD)
    #[serde(default)]
    pub max_cost_per_request: Option<f64>,
}

impl Default for OrchestratorAppConfig {
    fn default() -> Self {
        Self {
            max_step_invocations: default_max_invocations(),
            max_task_tokens: default_max_tokens(),
            tier_preference: default_preference(),
            max_cost_per_request: None,
        }
    }
}

fn default_max_invocations() -> u32 {
    20
}
fn default_max_tokens() -> u64 {
    200_000
}
fn default_preference() -> String {
    "none".to_string()
}

/// Load configuration from files and environment
pub fn load_config() -> Result<AppConfig> {
    let config = Config::builder()
        .add_source(File::with_name("config/maestro").required(false))
        .add_source(
            Environment::with_prefix("MAESTRO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}
