//! Bounded FIFO of job payloads shared by the worker pool.

use std::num::NonZeroUsize;

use queue_core::JobPayload;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Why a payload was handed back by [`JobQueue::enqueue`].
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    /// Every slot is taken.
    #[error("queue is full")]
    Full(JobPayload),
    /// The queue was closed for shutdown.
    #[error("queue is closed")]
    Closed(JobPayload),
}

impl EnqueueError {
    /// Take back the rejected payload.
    pub fn into_payload(self) -> JobPayload {
        match self {
            EnqueueError::Full(payload) | EnqueueError::Closed(payload) => payload,
        }
    }
}

/// Bounded multi-consumer FIFO queue.
///
/// Slots are the permits of a bounded channel: `enqueue` takes one without
/// waiting and a dequeue returns it, so the depth can never exceed the
/// capacity or drift under concurrent workers. Consumers take turns on the
/// receiver through a fair mutex, which keeps dequeue order equal to enqueue
/// order.
pub struct JobQueue {
    tx: mpsc::Sender<JobPayload>,
    rx: Mutex<mpsc::Receiver<JobPayload>>,
    capacity: usize,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` payloads.
    pub fn new(capacity: NonZeroUsize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.get());
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity: capacity.get(),
        }
    }

    /// Add a payload without waiting.
    ///
    /// A full or closed queue hands the payload back immediately.
    pub fn enqueue(&self, payload: JobPayload) -> Result<(), EnqueueError> {
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(payload) => EnqueueError::Full(payload),
            mpsc::error::TrySendError::Closed(payload) => EnqueueError::Closed(payload),
        })
    }

    /// Wait for the next payload, or `None` once `cancel` fires or the queue
    /// is closed and empty.
    ///
    /// Cancellation wins over a ready item, so a stopping worker never claims
    /// new work.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<JobPayload> {
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            rx = self.rx.lock() => rx,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            payload = rx.recv() => payload,
        }
    }

    /// Current number of waiting payloads.
    pub fn size(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }

    /// Stop accepting payloads. Items already queued stay available to
    /// [`JobQueue::drain`].
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Remove and return everything currently queued, oldest first.
    pub async fn drain(&self) -> Vec<JobPayload> {
        let mut rx = self.rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            drained.push(payload);
        }
        drained
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .finish()
    }
}
