//! Storybook Builder - illustrated children's book generation pipeline
//!
//! Turns a user's photo-backed book draft into a finished illustrated book
//! in two queue-driven stages: one story generation job per book, then one
//! illustration job per page fanned out under a finalize parent that
//! aggregates the page outcomes into the book's terminal status.
//!
//! Jobs live in Postgres; workers claim them with `FOR UPDATE SKIP LOCKED`
//! and retry with exponential backoff. Model, fetch, and upload
//! collaborators sit behind traits so processors are testable without the
//! network.

pub mod ai;
pub mod assets;
pub mod db;
pub mod error;
pub mod fetch;
pub mod orchestrator;
pub mod prompts;
pub mod queue;
pub mod story;
pub mod styles;
pub mod worker;

pub use error::{PipelineError, Result};
