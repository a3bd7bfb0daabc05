//! Worker configuration

use crate::queue::QueueName;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Poll interval when no jobs are runnable
    pub poll_interval: Duration,

    /// Per-job processing timeout
    pub job_timeout: Duration,

    /// Concurrent story jobs (one job covers a whole book)
    pub story_concurrency: usize,

    /// Concurrent illustration jobs (one job per page)
    pub illustration_concurrency: usize,

    /// Concurrent finalize jobs
    pub finalize_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            job_timeout: Duration::from_secs(300), // 5 minutes
            story_concurrency: 5,
            illustration_concurrency: 9,
            finalize_concurrency: 5,
        }
    }
}

impl WorkerConfig {
    /// Create a new config builder
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Concurrency bound for a queue
    pub fn concurrency_for(&self, queue: QueueName) -> usize {
        let limit = match queue {
            QueueName::StoryGeneration => self.story_concurrency,
            QueueName::IllustrationGeneration => self.illustration_concurrency,
            QueueName::BookFinalize => self.finalize_concurrency,
        };
        limit.max(1)
    }
}

/// Builder for WorkerConfig
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl Default for WorkerConfigBuilder {
    fn default() -> Self {
        Self {
            config: WorkerConfig::default(),
        }
    }
}

impl WorkerConfigBuilder {
    /// Set poll interval
    pub fn poll_interval(mut self, duration: Duration) -> Self {
        self.config.poll_interval = duration;
        self
    }

    /// Set poll interval in seconds
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval = Duration::from_secs(secs);
        self
    }

    /// Set per-job timeout
    pub fn job_timeout(mut self, duration: Duration) -> Self {
        self.config.job_timeout = duration;
        self
    }

    /// Set story queue concurrency
    pub fn story_concurrency(mut self, limit: usize) -> Self {
        self.config.story_concurrency = limit;
        self
    }

    /// Set illustration queue concurrency
    pub fn illustration_concurrency(mut self, limit: usize) -> Self {
        self.config.illustration_concurrency = limit;
        self
    }

    /// Set finalize queue concurrency
    pub fn finalize_concurrency(mut self, limit: usize) -> Self {
        self.config.finalize_concurrency = limit;
        self
    }

    /// Build the config
    pub fn build(self) -> WorkerConfig {
        self.config
    }
}
