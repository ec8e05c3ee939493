//! Core domain types for the job queue system.
//!
//! This crate contains shared types used across all packages:
//! - Job ids, payloads, records and the status state machine
//! - Queue configuration, pool state and statistics
//! - Events for real-time updates

mod events;
mod job;
mod queue;

pub use events::JobEvent;
pub use job::{
    JobId, JobPayload, JobRecord, JobResult, JobStatus, TransitionError, UnknownStatus,
};
pub use queue::{ConfigError, PoolState, QueueConfig, QueueStats, RetryPolicy};
