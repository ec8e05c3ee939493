//! Job queue runtime.
//!
//! This crate provides the bounded queue, the worker pool that drains it,
//! the processors that do the work and the [`JobService`] tying them to a
//! [`db::JobStore`].
//!
//! # Architecture
//!
//! - `JobQueue` - bounded FIFO of payloads; full means rejected, never blocked
//! - `Worker` - dequeues, claims the record, runs the processor, reports
//! - `Supervisor` - ractor actor that owns the pool and serializes start/stop
//! - `JobService` - submission, status reads, stats, events and lifecycle
//!
//! # Usage
//!
//! ```ignore
//! use actors::{JobService, LocalConfig, ProcessorConfig, build_processor};
//! use db::MemoryJobStore;
//! use queue_core::{JobPayload, QueueConfig};
//!
//! let service = JobService::new(QueueConfig::default(), Arc::new(MemoryJobStore::new())).await?;
//! service.start(build_processor(&ProcessorConfig::Local(LocalConfig::default()))).await?;
//!
//! let record = service.submit(JobPayload::new(json!({ "index": 1 }))).await?;
//! let status = service.get_status(record.id).await?;
//! ```

mod error;
mod messages;
mod pool;
mod processor;
mod queue;
mod remote;
mod retry;
mod service;
mod supervisor;
mod worker;

pub use error::{JobError, ServiceError, SubmitError};
pub use processor::{
    FnProcessor, LocalConfig, LocalProcessor, Processor, ProcessorConfig, ProcessorError,
    ProcessorFuture, ProcessorResult, build_processor,
};
pub use queue::{EnqueueError, JobQueue};
pub use remote::{RemoteCommand, RemoteConfig, RemoteProcessor};
pub use service::{JobService, SHUTDOWN_MESSAGE};
