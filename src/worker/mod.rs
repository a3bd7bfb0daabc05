//! Queue workers

pub mod config;
pub mod finalize;
pub mod illustration;
pub mod runner;
pub mod story;

pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use finalize::FinalizeProcessor;
pub use illustration::IllustrationProcessor;
pub use runner::{setup_signal_handler, PipelineWorkers, WorkerRunner};
pub use story::StoryProcessor;
