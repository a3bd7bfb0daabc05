//! Worker runner
//!
//! Poll loop over one queue: claim, dispatch to the matching processor
//! under a timeout, then complete or fail the job. Concurrency per queue
//! is bounded by the config; shutdown drains in-flight jobs before
//! returning.

use crate::db::DbPool;
use crate::error::{PipelineError, Result};
use crate::queue::{Job, JobPayload, JobQueue, QueueName};
use crate::worker::config::WorkerConfig;
use crate::worker::finalize::FinalizeProcessor;
use crate::worker::illustration::IllustrationProcessor;
use crate::worker::story::StoryProcessor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// The three pipeline processors, dispatched by queue
pub struct PipelineWorkers {
    pub story: StoryProcessor,
    pub illustration: IllustrationProcessor,
    pub finalize: FinalizeProcessor,
}

impl PipelineWorkers {
    /// Dispatch a claimed job to its processor
    ///
    /// A payload that does not belong on the claimed queue is rejected
    /// without retry value; it can only come from a buggy producer.
    pub async fn dispatch(&self, pool: &DbPool, queue: QueueName, job: &Job) -> Result<()> {
        let payload = job.decode_payload()?;

        if payload.queue() != queue {
            return Err(PipelineError::InvalidJob(format!(
                "job {} carries a {} payload but was claimed from {}",
                job.id,
                payload.queue().as_str(),
                queue.as_str()
            )));
        }

        match payload {
            JobPayload::StoryGeneration(data) => self.story.process(pool, &data).await,
            JobPayload::IllustrationGeneration(data) => {
                self.illustration.process(pool, &data).await
            }
            JobPayload::BookFinalize(data) => self.finalize.process(pool, &data).await,
        }
    }
}

/// Polls one queue and runs jobs until shutdown
pub struct WorkerRunner {
    queue_client: JobQueue,
    config: WorkerConfig,
    workers: Arc<PipelineWorkers>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerRunner {
    pub fn new(
        queue_client: JobQueue,
        config: WorkerConfig,
        workers: Arc<PipelineWorkers>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            queue_client,
            config,
            workers,
            shutdown,
        }
    }

    /// Run the poll loop until shutdown is requested
    pub async fn run(&self, queue: QueueName) -> Result<()> {
        let limit = self.config.concurrency_for(queue);
        info!(
            "Worker started on {} (concurrency {}, poll {:?})",
            queue.as_str(),
            limit,
            self.config.poll_interval
        );

        let mut in_flight: JoinSet<()> = JoinSet::new();

        while !self.shutdown.load(Ordering::SeqCst) {
            // Keep the in-flight set within the queue's bound before
            // claiming more work.
            while in_flight.len() >= limit {
                if let Some(Err(e)) = in_flight.join_next().await {
                    error!("Worker task panicked: {}", e);
                }
            }
            while let Some(result) = in_flight.try_join_next() {
                if let Err(e) = result {
                    error!("Worker task panicked: {}", e);
                }
            }

            match self.queue_client.claim_next(queue).await {
                Ok(Some(job)) => {
                    let queue_client = self.queue_client.clone();
                    let workers = self.workers.clone();
                    let job_timeout = self.config.job_timeout;
                    in_flight.spawn(async move {
                        execute_job(&queue_client, &workers, job_timeout, queue, job).await;
                    });
                }
                Ok(None) => {
                    debug!("No runnable jobs on {}, sleeping", queue.as_str());
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    error!("Failed to claim job on {}: {}", queue.as_str(), e);
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }

        info!(
            "Shutdown requested, draining {} in-flight jobs on {}",
            in_flight.len(),
            queue.as_str()
        );
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!("Worker task panicked during drain: {}", e);
            }
        }

        info!("Worker stopped on {}", queue.as_str());
        Ok(())
    }

    /// Claim and run at most one job; returns whether a job was found
    ///
    /// Used by the CLI's --once mode and by tests that step the pipeline
    /// deterministically.
    pub async fn run_once(&self, queue: QueueName) -> Result<bool> {
        let Some(job) = self.queue_client.claim_next(queue).await? else {
            return Ok(false);
        };

        execute_job(
            &self.queue_client,
            &self.workers,
            self.config.job_timeout,
            queue,
            job,
        )
        .await;
        Ok(true)
    }
}

/// Run one claimed job to a terminal queue state
///
/// Processor errors and timeouts go through `fail` for retry scheduling;
/// bookkeeping errors are logged rather than crashing the loop.
async fn execute_job(
    queue_client: &JobQueue,
    workers: &PipelineWorkers,
    job_timeout: Duration,
    queue: QueueName,
    job: Job,
) {
    debug!(
        "Running job {} ({}) attempt {}/{}",
        job.id, job.name, job.attempts, job.max_attempts
    );

    let outcome = tokio::time::timeout(
        job_timeout,
        workers.dispatch(queue_client.pool(), queue, &job),
    )
    .await;

    let result = match outcome {
        Ok(Ok(())) => queue_client.complete(&job).await,
        Ok(Err(e)) => {
            warn!("Job {} ({}) failed: {}", job.id, job.name, e);
            queue_client.fail(&job, &e.to_string()).await
        }
        Err(_) => {
            warn!(
                "Job {} ({}) timed out after {:?}",
                job.id, job.name, job_timeout
            );
            queue_client
                .fail(&job, &PipelineError::JobTimeout.to_string())
                .await
        }
    };

    if let Err(e) = result {
        error!("Failed to record outcome of job {}: {}", job.id, e);
    }
}

/// Install a Ctrl-C handler that flips the shared shutdown flag
pub fn setup_signal_handler(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        shutdown.store(true, Ordering::SeqCst);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::payload::FinalizeJob;
    use chrono::Utc;
    use uuid::Uuid;

    fn job_on(queue: QueueName, payload: &JobPayload) -> Job {
        Job {
            id: 1,
            queue: queue.as_str().to_string(),
            name: "test-job".to_string(),
            payload: serde_json::to_value(payload).unwrap(),
            status: "running".to_string(),
            attempts: 1,
            max_attempts: 3,
            backoff_base_ms: 10_000,
            run_at: Utc::now(),
            parent_id: None,
            pending_children: 0,
            fail_parent_on_failure: false,
            remove_dependency_on_failure: false,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_payload_queue_mapping() {
        let payload = JobPayload::BookFinalize(FinalizeJob {
            book_id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
        });
        assert_eq!(payload.queue(), QueueName::BookFinalize);

        let job = job_on(QueueName::BookFinalize, &payload);
        assert_eq!(job.decode_payload().unwrap().queue(), QueueName::BookFinalize);
    }

    #[test]
    fn test_undecodable_payload_detected() {
        let mut job = job_on(
            QueueName::BookFinalize,
            &JobPayload::BookFinalize(FinalizeJob {
                book_id: Uuid::new_v4(),
                user_id: "user_1".to_string(),
            }),
        );
        job.payload = serde_json::json!({ "type": "pdf_export" });
        assert!(job.decode_payload().is_err());
    }
}
