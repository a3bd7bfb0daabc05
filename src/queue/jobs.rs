//! Job queue operations
//!
//! Jobs live in a single Postgres table partitioned by queue name. Claiming
//! uses a `FOR UPDATE SKIP LOCKED` CTE so concurrent workers never hand the
//! same job to two consumers. Retries are scheduled by pushing `run_at`
//! forward with exponential backoff; a job that exhausts its attempts is
//! dead-lettered in place (`status = 'failed'`, `last_error` kept).

use crate::error::Result;
use crate::queue::payload::JobPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Row};
use std::time::Duration;
use tracing::{info, warn};

/// The three pipeline queues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueName {
    StoryGeneration,
    IllustrationGeneration,
    BookFinalize,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::StoryGeneration => "story-generation",
            QueueName::IllustrationGeneration => "illustration-generation",
            QueueName::BookFinalize => "book-finalize",
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    WaitingChildren,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::WaitingChildren => "waiting_children",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Job row
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: i64,
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub run_at: DateTime<Utc>,
    pub parent_id: Option<i64>,
    pub pending_children: i32,
    pub fail_parent_on_failure: bool,
    pub remove_dependency_on_failure: bool,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Decode the typed payload
    pub fn decode_payload(&self) -> Result<JobPayload> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Retry and flow options attached at enqueue time
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub max_attempts: i32,
    pub backoff_base: Duration,
    /// Whether this child's terminal failure also fails its parent
    pub fail_parent_on_failure: bool,
    /// Whether this child's terminal failure prunes it from the parent's
    /// wait-set instead of blocking the parent forever
    pub remove_dependency_on_failure: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_base: Duration::ZERO,
            fail_parent_on_failure: false,
            remove_dependency_on_failure: false,
        }
    }
}

impl JobOptions {
    /// Standard pipeline retry policy: 3 attempts, exponential backoff
    /// starting at 10 seconds.
    pub fn with_retries() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(10),
            ..Self::default()
        }
    }
}

/// Delay before retry attempt `attempt` (1-based), doubling per attempt
pub fn retry_delay_ms(backoff_base_ms: i64, attempt: i32) -> i64 {
    let exp = attempt.saturating_sub(1).min(30) as u32;
    backoff_base_ms.saturating_mul(1_i64 << exp)
}

/// Explicitly constructed queue client
///
/// Passed into workers and the orchestrator rather than living as ambient
/// module state; lifecycle follows the pool it wraps.
#[derive(Debug, Clone)]
pub struct JobQueue {
    pool: PgPool,
}

impl JobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Enqueue a standalone job
    pub async fn enqueue(
        &self,
        queue: QueueName,
        name: &str,
        payload: &JobPayload,
        opts: &JobOptions,
    ) -> Result<i64> {
        let payload = serde_json::to_value(payload)?;

        let row = sqlx::query(
            r#"
            INSERT INTO jobs (queue, name, payload, status, max_attempts, backoff_base_ms)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            RETURNING id
            "#,
        )
        .bind(queue.as_str())
        .bind(name)
        .bind(payload)
        .bind(opts.max_attempts)
        .bind(opts.backoff_base.as_millis() as i64)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");
        info!("Enqueued job {} ({}) on {}", id, name, queue.as_str());
        Ok(id)
    }

    /// Atomically claim the next runnable job on a queue
    ///
    /// Safe for concurrent workers; the claim also counts the attempt.
    pub async fn claim_next(&self, queue: QueueName) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            WITH next_job AS (
                SELECT id FROM jobs
                WHERE queue = $1
                  AND status = 'pending'
                  AND run_at <= NOW()
                ORDER BY id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET status = 'running',
                attempts = attempts + 1,
                updated_at = NOW()
            WHERE id = (SELECT id FROM next_job)
            RETURNING *
            "#,
        )
        .bind(queue.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    /// Complete a job and settle its parent's wait-set
    pub async fn complete(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'completed',
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        if let Some(parent_id) = job.parent_id {
            self.settle_child(parent_id).await?;
        }

        Ok(())
    }

    /// Record a failed attempt: reschedule with backoff while attempts
    /// remain, otherwise dead-letter and settle the parent per the job's
    /// failure-propagation flags.
    pub async fn fail(&self, job: &Job, error: &str) -> Result<()> {
        if job.attempts < job.max_attempts {
            let delay_ms = retry_delay_ms(job.backoff_base_ms, job.attempts);
            warn!(
                "Job {} attempt {}/{} failed, retrying in {}ms: {}",
                job.id, job.attempts, job.max_attempts, delay_ms, error
            );

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'pending',
                    run_at = NOW() + $2 * INTERVAL '1 millisecond',
                    last_error = $3,
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job.id)
            .bind(delay_ms)
            .bind(error)
            .execute(&self.pool)
            .await?;

            return Ok(());
        }

        warn!(
            "Job {} exhausted {} attempts, dead-lettering: {}",
            job.id, job.max_attempts, error
        );

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed',
                last_error = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job.id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if let Some(parent_id) = job.parent_id {
            if job.fail_parent_on_failure {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'failed',
                        last_error = $2,
                        updated_at = NOW()
                    WHERE id = $1
                      AND status = 'waiting_children'
                    "#,
                )
                .bind(parent_id)
                .bind(format!("child job {} failed", job.id))
                .execute(&self.pool)
                .await?;
            } else if job.remove_dependency_on_failure {
                // Prune the failed child from the wait-set so the parent
                // still runs once every sibling settles.
                self.settle_child(parent_id).await?;
            }
            // Neither flag set: the parent keeps waiting on a dependency
            // that will never arrive. The orchestrator never enqueues
            // children in that configuration.
        }

        Ok(())
    }

    /// Remove one child from a waiting parent's dependency set, releasing
    /// the parent once the set drains.
    async fn settle_child(&self, parent_id: i64) -> Result<()> {
        let released = sqlx::query(
            r#"
            UPDATE jobs
            SET pending_children = pending_children - 1,
                status = CASE
                    WHEN pending_children - 1 <= 0 THEN 'pending'
                    ELSE status
                END,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'waiting_children'
            RETURNING status
            "#,
        )
        .bind(parent_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = released {
            let status: String = row.get("status");
            if status == "pending" {
                info!("All children settled, parent job {} released", parent_id);
            }
        }

        Ok(())
    }

    /// Count runnable jobs on a queue (monitoring)
    pub async fn count_pending(&self, queue: QueueName) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM jobs
            WHERE queue = $1
              AND status = 'pending'
            "#,
        )
        .bind(queue.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay_ms(10_000, 1), 10_000);
        assert_eq!(retry_delay_ms(10_000, 2), 20_000);
        assert_eq!(retry_delay_ms(10_000, 3), 40_000);
    }

    #[test]
    fn test_retry_delay_zero_base() {
        assert_eq!(retry_delay_ms(0, 3), 0);
    }

    #[test]
    fn test_retry_delay_saturates() {
        assert!(retry_delay_ms(i64::MAX, 5) > 0);
    }

    #[test]
    fn test_queue_names_distinct() {
        assert_ne!(
            QueueName::StoryGeneration.as_str(),
            QueueName::IllustrationGeneration.as_str()
        );
        assert_ne!(
            QueueName::IllustrationGeneration.as_str(),
            QueueName::BookFinalize.as_str()
        );
    }
}
