//! Store - SQLite persistence for orchestrator aggregates
//!
//! Each aggregate is persisted as a JSON document in a `data` column with
//! indexed scalar columns alongside. Reads run the document back through
//! serde; a validation failure is logged and reported as absence, never a
//! crash. Task updates are whole-aggregate writes guarded by a version
//! counter.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::approval::Approval;
use crate::error::{Error, Result};
use crate::types::{LibraryEntry, Project, Run, RunStatus, Task, TerminationRecord};


/// Store for persisting orchestrator state to SQLite
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Create a store over an existing connection pool
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a store from a database path.
    ///
    /// Creates the database file if needed and runs migrations.
    pub async fn from_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Database(format!("failed to create directory: {e}")))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!("SQLite store initialized at {}", db_path.display());
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;

        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        for ddl in [
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                status TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS approvals (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS terminations (
                run_id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS library (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_runs_user ON runs(user_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_library_user ON library(user_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_approvals_user_status ON approvals(user_id, status)",
            "CREATE INDEX IF NOT EXISTS idx_projects_user ON projects(user_id)",
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        }
        Ok(())
    }

    /// Liveness probe for health checks
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Serialize an aggregate to its JSON document
    fn encode<T: Serialize>(entity: &'static str, value: &T) -> Result<String> {
        serde_json::to_string(value)
            .map_err(|e| Error::Database(format!("failed to serialize {entity}: {e}")))
    }

    /// Deserialize a stored document; a validation failure is absence
    fn decode<T: DeserializeOwned>(entity: &'static str, id: &str, data: &str) -> Option<T> {
        match serde_json::from_str(data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(entity, id, error = %e, "Stored document failed schema validation, treating as not found");
                None
            }
        }
    }

    // ========================================================================
    // Projects
    // ========================================================================

    /// Insert a project
    pub async fn create_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            "INSERT INTO projects (id, user_id, name, data, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&project.id)
        .bind(&project.user_id)
        .bind(&project.name)
        .bind(Self::encode("project", project)?)
        .bind(project.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Fetch a project by id
    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT data FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.and_then(|r| Self::decode("project", id, &r.get::<String, _>("data"))))
    }

    /// Fetch a user's project by name
    pub async fn get_project_by_name(&self, user_id: &str, name: &str) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT data FROM projects WHERE user_id = ? AND name = ?")
            .bind(user_id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.and_then(|r| Self::decode("project", name, &r.get::<String, _>("data"))))
    }

    /// List a user's projects, newest first
    pub async fn list_projects(&self, user_id: &str) -> Result<Vec<Project>> {
        let rows =
            sqlx::query("SELECT data FROM projects WHERE user_id = ? ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|r| Self::decode("project", user_id, &r.get::<String, _>("data")))
            .collect())
    }

    // ========================================================================
    // Library
    // ========================================================================

    /// Insert a library entry
    pub async fn create_library_entry(&self, entry: &LibraryEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO library (id, user_id, title, data, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.title)
        .bind(Self::encode("library entry", entry)?)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Fetch a library entry by id
    pub async fn get_library_entry(&self, id: &str) -> Result<Option<LibraryEntry>> {
        let row = sqlx::query("SELECT data FROM library WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.and_then(|r| Self::decode("library entry", id, &r.get::<String, _>("data"))))
    }

    /// List a user's library entries, newest first
    pub async fn list_library(&self, user_id: &str) -> Result<Vec<LibraryEntry>> {
        let rows =
            sqlx::query("SELECT data FROM library WHERE user_id = ? ORDER BY created_at DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|r| Self::decode("library entry", user_id, &r.get::<String, _>("data")))
            .collect())
    }

    /// Delete a library entry; returns whether a row was removed
    pub async fn delete_library_entry(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM library WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    /// Insert a task
    pub async fn create_task(&self, task: &Task) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, user_id, project_id, status, version, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(task.id.to_string())
        .bind(&task.user_id)
        .bind(&task.project_id)
        .bind(task.status.as_str())
        .bind(task.version)
        .bind(Self::encode("task", task)?)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Fetch a task by id
    pub async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT data FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.and_then(|r| Self::decode("task", &id.to_string(), &r.get::<String, _>("data"))))
    }

    /// Write a whole task aggregate, guarded by its version.
    ///
    /// On success the in-memory version is bumped. A lost race surfaces as
    /// `Error::Conflict` so the caller re-reads instead of clobbering.
    pub async fn update_task(&self, task: &mut Task) -> Result<()> {
        let expected = task.version;
        task.version = expected + 1;
        task.updated_at = Utc::now();
        let data = Self::encode("task", task)?;

        let result = sqlx::query(
            r#"
            UPDATE tasks SET status = ?, version = ?, data = ?, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(task.status.as_str())
        .bind(task.version)
        .bind(data)
        .bind(task.updated_at.to_rfc3339())
        .bind(task.id.to_string())
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            task.version = expected;
            return Err(Error::Conflict {
                entity: "task",
                id: task.id.to_string(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Insert a run
    pub async fn create_run(&self, run: &Run) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runs (id, task_id, user_id, status, data, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.task_id.to_string())
        .bind(&run.user_id)
        .bind(run.status.as_str())
        .bind(Self::encode("run", run)?)
        .bind(run.created_at.to_rfc3339())
        .bind(run.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Fetch a run by id
    pub async fn get_run(&self, id: Uuid) -> Result<Option<Run>> {
        let row = sqlx::query("SELECT data FROM runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.and_then(|r| Self::decode("run", &id.to_string(), &r.get::<String, _>("data"))))
    }

    /// Write a whole run aggregate.
    ///
    /// A run that already reached `terminated` is immutable: the update is
    /// skipped silently, making terminal-state mutations no-ops.
    pub async fn update_run(&self, run: &Run) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE runs SET status = ?, data = ?, updated_at = ?
            WHERE id = ? AND status != ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(Self::encode("run", run)?)
        .bind(Utc::now().to_rfc3339())
        .bind(run.id.to_string())
        .bind(RunStatus::Terminated.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            debug!(run_id = %run.id, "Update skipped for terminated run");
        }
        Ok(())
    }

    /// List a user's runs, newest first
    pub async fn list_runs(&self, user_id: &str, limit: i64) -> Result<Vec<Run>> {
        let rows = sqlx::query(
            "SELECT data FROM runs WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|r| Self::decode("run", user_id, &r.get::<String, _>("data")))
            .collect())
    }

    // ========================================================================
    // Approvals
    // ========================================================================

    /// Insert an approval
    pub async fn create_approval(&self, approval: &Approval) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO approvals (id, run_id, task_id, user_id, status, data, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(approval.id.to_string())
        .bind(approval.run_id.to_string())
        .bind(approval.task_id.to_string())
        .bind(&approval.user_id)
        .bind(approval.status.as_str())
        .bind(Self::encode("approval", approval)?)
        .bind(approval.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Fetch an approval by id
    pub async fn get_approval(&self, id: Uuid) -> Result<Option<Approval>> {
        let row = sqlx::query("SELECT data FROM approvals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.and_then(|r| Self::decode("approval", &id.to_string(), &r.get::<String, _>("data"))))
    }

    /// Write a whole approval aggregate
    pub async fn update_approval(&self, approval: &Approval) -> Result<()> {
        sqlx::query("UPDATE approvals SET status = ?, data = ? WHERE id = ?")
            .bind(approval.status.as_str())
            .bind(Self::encode("approval", approval)?)
            .bind(approval.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// List a user's pending approvals, oldest first
    pub async fn pending_approvals(&self, user_id: &str) -> Result<Vec<Approval>> {
        let rows = sqlx::query(
            "SELECT data FROM approvals WHERE user_id = ? AND status = 'pending' ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|r| Self::decode("approval", user_id, &r.get::<String, _>("data")))
            .collect())
    }

    /// List pending approvals referencing a run
    pub async fn pending_approvals_for_run(&self, run_id: Uuid) -> Result<Vec<Approval>> {
        let rows = sqlx::query(
            "SELECT data FROM approvals WHERE run_id = ? AND status = 'pending' ORDER BY created_at ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|r| Self::decode("approval", &run_id.to_string(), &r.get::<String, _>("data")))
            .collect())
    }

    // ========================================================================
    // Termination records
    // ========================================================================

    /// Write a termination record. Written exactly once: a second write for
    /// the same run is ignored.
    pub async fn insert_termination(&self, record: &TerminationRecord) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO terminations (run_id, data, created_at) VALUES (?, ?, ?)",
        )
        .bind(record.run_id.to_string())
        .bind(Self::encode("termination", record)?)
        .bind(record.ended_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Fetch the termination record for a run
    pub async fn get_termination(&self, run_id: Uuid) -> Result<Option<TerminationRecord>> {
        let row = sqlx::query("SELECT data FROM terminations WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.and_then(|r| {
            Self::decode("termination", &run_id.to_string(), &r.get::<String, _>("data"))
        }))
    }
}
