//! Shared job table client
//!
//! Multiple worker processes contend for rows in one `PostgreSQL`
//! `ocr_tasks` table. Mutual exclusion rests entirely on the database's
//! `FOR UPDATE SKIP LOCKED` claim primitive: concurrent claimers never
//! block each other on a contended row, they simply see fewer candidates.
//!
//! A [`TaskQueue`] is a scope-bound session: the worker opens one per loop
//! iteration and drops it on every exit path. Dropping the client ends the
//! spawned connection driver as well.
//!
//! # Example
//! ```no_run
//! use menu_ocr_queue::{QueueConfig, TaskQueue};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), menu_ocr_queue::QueueError> {
//!     let queue = TaskQueue::connect(&QueueConfig::default()).await?;
//!     if let Some(task) = queue.claim_next(Duration::from_secs(300)).await? {
//!         println!("claimed task {} for {}", task.id, task.file_path);
//!     }
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, Utc};
use menu_ocr_common::RecognizedLine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info};

/// Queue layer errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("PostgreSQL error: {0}")]
    Postgres(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// `PostgreSQL` connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("OCR_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("OCR_DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("OCR_DB_NAME").unwrap_or_else(|_| "menu_ocr".to_string()),
            user: std::env::var("OCR_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("OCR_DB_PASSWORD").unwrap_or_default(),
        }
    }
}

impl QueueConfig {
    /// Build connection string
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// Task lifecycle states in the job table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Status string as stored in the table.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> QueueResult<Self> {
        match raw {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(QueueError::Serialization(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

/// A task handed to a worker by a successful claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedTask {
    pub id: i64,
    /// Image path relative to the shared root directory
    pub file_path: String,
}

/// Full task row, used for inspection and tests
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: i64,
    pub file_path: String,
    pub status: TaskStatus,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// One scope-bound session against the shared job table
pub struct TaskQueue {
    client: Client,
}

impl TaskQueue {
    /// Open a new session.
    ///
    /// The connection driver runs on a spawned task and exits once this
    /// client is dropped.
    pub async fn connect(config: &QueueConfig) -> QueueResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    /// Initialize the job table schema (create if not exists).
    ///
    /// In production the surrounding platform owns this table; the worker
    /// still knows how to create it for self-contained deployments and
    /// integration tests.
    pub async fn init_schema(&self) -> QueueResult<()> {
        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS ocr_tasks (
                    id BIGSERIAL PRIMARY KEY,
                    file_path TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    processing_started_at TIMESTAMP WITH TIME ZONE,
                    result JSONB,
                    error TEXT,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
                )
                ",
                &[],
            )
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_ocr_tasks_claim
                 ON ocr_tasks(status, processing_started_at)",
                &[],
            )
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        info!("ocr_tasks schema initialized");

        Ok(())
    }

    /// Atomically claim the next eligible task.
    ///
    /// Eligible rows are pending tasks, plus processing tasks whose
    /// `processing_started_at` is older than `stale_after` (a crashed or
    /// hung worker's claim expiring). The oldest-created eligible row wins.
    /// Rows currently locked by a concurrent claimer are skipped, never
    /// waited on. Returns `None` when no eligible row exists.
    pub async fn claim_next(&self, stale_after: Duration) -> QueueResult<Option<ClaimedTask>> {
        let row = self
            .client
            .query_opt(
                r"
                UPDATE ocr_tasks
                SET
                    status = 'processing',
                    processing_started_at = now()
                WHERE id = (
                    SELECT id
                    FROM ocr_tasks
                    WHERE status = 'pending'
                    OR (
                        status = 'processing'
                        AND processing_started_at < now() - make_interval(secs => $1)
                    )
                    ORDER BY id
                    FOR UPDATE SKIP LOCKED
                    LIMIT 1
                )
                RETURNING id, file_path
                ",
                &[&stale_after.as_secs_f64()],
            )
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        Ok(row.map(|row| {
            let task = ClaimedTask {
                id: row.get(0),
                file_path: row.get(1),
            };
            debug!("claimed task {} ({})", task.id, task.file_path);
            task
        }))
    }

    /// Record a successful result: status becomes `completed`, the
    /// serialized lines land in `result`, any previous error is cleared.
    ///
    /// Idempotent per id; there is deliberately no guard against a second
    /// finalize of the same task.
    pub async fn complete(&self, id: i64, lines: &[RecognizedLine]) -> QueueResult<()> {
        let result = serde_json::to_value(lines)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        self.client
            .execute(
                r"
                UPDATE ocr_tasks
                SET
                    status = 'completed',
                    result = $2,
                    error = NULL
                WHERE id = $1
                ",
                &[&id, &result],
            )
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        info!("task {} completed with {} lines", id, lines.len());

        Ok(())
    }

    /// Record a failure: status becomes `failed`, the message lands in
    /// `error`, any previous result is cleared.
    pub async fn fail(&self, id: i64, error: &str) -> QueueResult<()> {
        self.client
            .execute(
                r"
                UPDATE ocr_tasks
                SET
                    status = 'failed',
                    error = $2,
                    result = NULL
                WHERE id = $1
                ",
                &[&id, &error],
            )
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        info!("task {} failed: {}", id, error);

        Ok(())
    }

    /// Insert a new pending task. Task creation belongs to the surrounding
    /// platform in production; the worker exposes it for tooling and tests.
    pub async fn enqueue(&self, file_path: &str) -> QueueResult<i64> {
        let row = self
            .client
            .query_one(
                "INSERT INTO ocr_tasks (file_path, status) VALUES ($1, 'pending') RETURNING id",
                &[&file_path],
            )
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        Ok(row.get(0))
    }

    /// Fetch one task row by id.
    pub async fn get_task(&self, id: i64) -> QueueResult<TaskRecord> {
        let row = self
            .client
            .query_opt(
                r"
                SELECT id, file_path, status, processing_started_at, result, error
                FROM ocr_tasks
                WHERE id = $1
                ",
                &[&id],
            )
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?
            .ok_or_else(|| QueueError::Postgres(format!("task {id} not found")))?;

        Ok(TaskRecord {
            id: row.get(0),
            file_path: row.get(1),
            status: TaskStatus::parse(row.get(2))?,
            processing_started_at: row.get(3),
            result: row.get(4),
            error: row.get(5),
        })
    }

    /// Number of tasks currently pending.
    pub async fn pending_count(&self) -> QueueResult<i64> {
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM ocr_tasks WHERE status = 'pending'",
                &[],
            )
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        Ok(row.get(0))
    }

    /// Remove every row from the job table. Test helper.
    pub async fn clear(&self) -> QueueResult<()> {
        self.client
            .execute("DELETE FROM ocr_tasks", &[])
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        Ok(())
    }

    /// Backdate a processing task's claim timestamp by `age`. Test helper
    /// for exercising stale reclaim without waiting out the timeout.
    pub async fn backdate_claim(&self, id: i64, age: Duration) -> QueueResult<()> {
        self.client
            .execute(
                r"
                UPDATE ocr_tasks
                SET processing_started_at = now() - make_interval(secs => $2)
                WHERE id = $1
                ",
                &[&id, &age.as_secs_f64()],
            )
            .await
            .map_err(|e| QueueError::Postgres(e.to_string()))?;

        Ok(())
    }
}
