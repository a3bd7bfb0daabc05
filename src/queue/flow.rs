//! Flow producer - atomic parent/child job graphs
//!
//! A flow binds one parent job to N children. The parent sits in
//! `waiting_children` and is not claimable until every child reaches a
//! terminal state; creation happens inside one transaction, so either the
//! whole graph is enqueued or none of it is.

use crate::error::Result;
use crate::queue::jobs::{JobOptions, QueueName};
use crate::queue::payload::JobPayload;
use sqlx::{PgPool, Row};
use tracing::info;

/// One child job definition inside a flow
#[derive(Debug, Clone)]
pub struct FlowChild {
    pub queue: QueueName,
    pub name: String,
    pub payload: JobPayload,
    pub opts: JobOptions,
}

/// Explicitly constructed flow producer over the shared pool
#[derive(Debug, Clone)]
pub struct FlowProducer {
    pool: PgPool,
}

impl FlowProducer {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically enqueue a parent job plus its children
    ///
    /// Returns the parent job id. A flow with no children degenerates to an
    /// immediately runnable parent.
    pub async fn add_flow(
        &self,
        parent_queue: QueueName,
        parent_name: &str,
        parent_payload: &JobPayload,
        parent_opts: &JobOptions,
        children: &[FlowChild],
    ) -> Result<i64> {
        let parent_payload = serde_json::to_value(parent_payload)?;
        let parent_status = if children.is_empty() {
            "pending"
        } else {
            "waiting_children"
        };

        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO jobs
                (queue, name, payload, status, max_attempts, backoff_base_ms, pending_children)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(parent_queue.as_str())
        .bind(parent_name)
        .bind(parent_payload)
        .bind(parent_status)
        .bind(parent_opts.max_attempts)
        .bind(parent_opts.backoff_base.as_millis() as i64)
        .bind(children.len() as i32)
        .fetch_one(&mut *tx)
        .await?;
        let parent_id: i64 = row.get("id");

        for child in children {
            let payload = serde_json::to_value(&child.payload)?;
            sqlx::query(
                r#"
                INSERT INTO jobs
                    (queue, name, payload, status, max_attempts, backoff_base_ms,
                     parent_id, fail_parent_on_failure, remove_dependency_on_failure)
                VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $8)
                "#,
            )
            .bind(child.queue.as_str())
            .bind(&child.name)
            .bind(payload)
            .bind(child.opts.max_attempts)
            .bind(child.opts.backoff_base.as_millis() as i64)
            .bind(parent_id)
            .bind(child.opts.fail_parent_on_failure)
            .bind(child.opts.remove_dependency_on_failure)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            "Added flow: parent job {} ({}) with {} children",
            parent_id,
            parent_name,
            children.len()
        );

        Ok(parent_id)
    }
}

#[cfg(test)]
mod tests {
    // Flow atomicity and settlement require a database - see
    // tests/pipeline_db.rs
}
