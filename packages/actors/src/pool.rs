//! Worker pool: a fixed number of worker tasks sharing one queue.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use db::JobStore;
use queue_core::{ConfigError, JobEvent, PoolState, QueueConfig, QueueStats};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::processor::Processor;
use crate::queue::JobQueue;
use crate::worker::Worker;

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Counters shared by the service and every worker.
#[derive(Debug, Default)]
pub(crate) struct PoolMetrics {
    pub(crate) in_flight: AtomicUsize,
    pub(crate) submitted: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) worker_crashes: AtomicU64,
}

/// Read side of a pool, cheap to clone and usable without going through
/// the lifecycle actor.
#[derive(Debug, Clone)]
pub(crate) struct PoolHandle {
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) metrics: Arc<PoolMetrics>,
    pub(crate) events: broadcast::Sender<JobEvent>,
    state: watch::Receiver<PoolState>,
    workers: usize,
}

impl PoolHandle {
    pub(crate) fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    pub(crate) fn stats(&self) -> QueueStats {
        let m = &self.metrics;
        QueueStats {
            state: self.state(),
            capacity: self.queue.capacity(),
            depth: self.queue.size(),
            workers: self.workers,
            in_flight: m.in_flight.load(Ordering::SeqCst),
            submitted: m.submitted.load(Ordering::Relaxed),
            rejected: m.rejected.load(Ordering::Relaxed),
            completed: m.completed.load(Ordering::Relaxed),
            failed: m.failed.load(Ordering::Relaxed),
            worker_crashes: m.worker_crashes.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Owns the worker tasks of the current generation.
pub(crate) struct WorkerPool<S: JobStore> {
    config: QueueConfig,
    store: Arc<S>,
    handle: PoolHandle,
    state_tx: watch::Sender<PoolState>,
    cancel: Option<CancellationToken>,
    tasks: Vec<JoinHandle<()>>,
    worker_counter: u64,
}

impl<S: JobStore> WorkerPool<S> {
    pub(crate) fn new(config: QueueConfig, store: Arc<S>) -> Result<Self, ConfigError> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.capacity).ok_or_else(|| ConfigError::Invalid {
            field: "capacity",
            reason: "must be at least 1".into(),
        })?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (state_tx, state_rx) = watch::channel(PoolState::Stopped);

        let handle = PoolHandle {
            queue: Arc::new(JobQueue::new(capacity)),
            metrics: Arc::new(PoolMetrics::default()),
            events,
            state: state_rx,
            workers: config.workers,
        };

        Ok(Self {
            config,
            store,
            handle,
            state_tx,
            cancel: None,
            tasks: Vec::new(),
            worker_counter: 0,
        })
    }

    pub(crate) fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    pub(crate) fn state(&self) -> PoolState {
        *self.state_tx.borrow()
    }

    /// Spawn a new generation of workers. Returns `false` if the pool is
    /// already running.
    pub(crate) fn start(&mut self, processor: Arc<dyn Processor>) -> bool {
        if self.state() != PoolState::Stopped {
            tracing::info!(state = %self.state(), "Worker pool already started");
            return false;
        }

        let cancel = CancellationToken::new();
        for _ in 0..self.config.workers {
            self.worker_counter += 1;
            let worker = Worker {
                id: format!("worker-{}", self.worker_counter),
                queue: self.handle.queue.clone(),
                store: self.store.clone(),
                processor: processor.clone(),
                retry: self.config.store_retry.clone(),
                metrics: self.handle.metrics.clone(),
                events: self.handle.events.clone(),
            };
            self.tasks.push(tokio::spawn(worker.run(cancel.clone())));
        }
        self.cancel = Some(cancel);

        self.set_state(PoolState::Running);
        tracing::info!(
            workers = self.config.workers,
            processor = processor.name(),
            depth = self.handle.queue.size(),
            "Worker pool started"
        );
        true
    }

    /// Signal every worker and wait until all of them have exited. Jobs in
    /// progress finish first; queued payloads stay queued. Returns `false`
    /// if the pool was not running.
    pub(crate) async fn stop(&mut self) -> bool {
        let Some(cancel) = self.cancel.take() else {
            tracing::debug!("Worker pool already stopped");
            return false;
        };

        self.set_state(PoolState::Stopping);
        tracing::info!(in_flight = self.handle.metrics.in_flight.load(Ordering::SeqCst), "Stopping worker pool");
        cancel.cancel();

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                self.handle.metrics.worker_crashes.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }

        self.set_state(PoolState::Stopped);
        tracing::info!(depth = self.handle.queue.size(), "Worker pool stopped");
        true
    }

    fn set_state(&self, new_state: PoolState) {
        let old_state = self.state_tx.send_replace(new_state);
        if old_state != new_state {
            self.handle.emit(JobEvent::PoolStateChanged {
                old_state,
                new_state,
                workers: self.config.workers,
                timestamp: Utc::now(),
            });
        }
    }
}
