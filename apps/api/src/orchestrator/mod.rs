//! Assessment Orchestrator: the only writer of assessment state.
//!
//! Synchronous operations validate input and perform one compare-and-set each;
//! analysis and evaluation run on a bounded worker pool fed by [`jobs::JobQueue`].
//! A periodic sweep errors anything stuck in a processing state.

pub mod handlers;
pub mod jobs;
pub mod service;
pub mod sweeper;

pub use jobs::{spawn_workers, JobQueue};
pub use service::Orchestrator;
pub use sweeper::spawn_sweeper;
