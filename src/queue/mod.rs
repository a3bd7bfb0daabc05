//! Durable Postgres-backed job queues with delayed retry and parent/child
//! flows.

pub mod flow;
pub mod jobs;
pub mod payload;

pub use flow::{FlowChild, FlowProducer};
pub use jobs::{Job, JobOptions, JobQueue, JobStatus, QueueName};
pub use payload::{FinalizeJob, IllustrationJob, JobPayload, StoryJob, StoryPageRef, StoryPromptContext};
