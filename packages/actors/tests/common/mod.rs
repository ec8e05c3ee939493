#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{JobService, Processor, ProcessorError, ProcessorFuture};
use db::{DbError, JobFilter, JobStore, MemoryJobStore};
use queue_core::{JobId, JobPayload, JobRecord, JobResult, JobStatus, QueueConfig, RetryPolicy};
use serde_json::json;
use tokio::sync::Semaphore;

/// Processor driven by the payload: `"fail": true` returns an error,
/// `"panic": true` panics, anything else succeeds. Jobs wait on the gate
/// when one is installed.
pub struct ScriptedProcessor {
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    started: Arc<Mutex<Vec<JobId>>>,
}

impl ScriptedProcessor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            gate: None,
            started: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Jobs block until [`Gate::open`] releases them.
    pub fn gated() -> (Self, Gate) {
        let semaphore = Arc::new(Semaphore::new(0));
        let processor = Self {
            gate: Some(semaphore.clone()),
            ..Self::new(Duration::ZERO)
        };
        (processor, Gate(semaphore))
    }

    /// Ids in the order their processing began.
    pub fn started(&self) -> Arc<Mutex<Vec<JobId>>> {
        self.started.clone()
    }
}

impl Processor for ScriptedProcessor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn execute(&self, payload: &JobPayload) -> ProcessorFuture {
        self.started.lock().unwrap().push(payload.id);

        let delay = self.delay;
        let gate = self.gate.clone();
        let params = payload.params.clone();

        Box::pin(async move {
            if let Some(gate) = gate {
                gate.acquire().await.expect("gate closed").forget();
            }
            tokio::time::sleep(delay).await;

            if params["panic"] == true {
                panic!("processor exploded");
            }
            if params["fail"] == true {
                return Err(ProcessorError::Failed("boom".into()));
            }
            Ok(JobResult::with_output("done", json!({ "index": params["index"].clone() })))
        })
    }
}

pub struct Gate(Arc<Semaphore>);

impl Gate {
    /// Let `jobs` more jobs finish.
    pub fn open(&self, jobs: usize) {
        self.0.add_permits(jobs);
    }
}

/// Store that fails the next `n` lifecycle writes with a retryable error.
/// Creates and reads always pass through.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryJobStore,
    failures: AtomicU32,
}

impl FlakyStore {
    pub fn failing(n: u32) -> Self {
        Self {
            inner: MemoryJobStore::new(),
            failures: AtomicU32::new(n),
        }
    }

    fn inject(&self) -> Result<(), DbError> {
        let took = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match took {
            Ok(_) => Err(DbError::Query("injected write failure".into())),
            Err(_) => Ok(()),
        }
    }
}

impl JobStore for FlakyStore {
    async fn create(&self, record: &JobRecord) -> Result<JobRecord, DbError> {
        self.inner.create(record).await
    }

    async fn transition(&self, id: JobId, to: JobStatus) -> Result<JobRecord, DbError> {
        self.inject()?;
        self.inner.transition(id, to).await
    }

    async fn attach_result(&self, id: JobId, result: &JobResult) -> Result<JobRecord, DbError> {
        self.inject()?;
        self.inner.attach_result(id, result).await
    }

    async fn attach_error(&self, id: JobId, error: &str) -> Result<JobRecord, DbError> {
        self.inject()?;
        self.inner.attach_error(id, error).await
    }

    async fn read(&self, id: JobId) -> Result<Option<JobRecord>, DbError> {
        self.inner.read(id).await
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, DbError> {
        self.inner.list(filter).await
    }

    async fn count(&self, status: Option<JobStatus>) -> Result<u64, DbError> {
        self.inner.count(status).await
    }
}

/// Store with one scripted fault: every result write fails, or the next
/// `n` claims panic inside the store call.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryJobStore,
    reject_results: AtomicBool,
    claim_panics: AtomicU32,
}

impl FaultyStore {
    pub fn rejecting_results() -> Self {
        Self {
            reject_results: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn panicking_on_claim(n: u32) -> Self {
        Self {
            claim_panics: AtomicU32::new(n),
            ..Self::default()
        }
    }
}

impl JobStore for FaultyStore {
    async fn create(&self, record: &JobRecord) -> Result<JobRecord, DbError> {
        self.inner.create(record).await
    }

    async fn transition(&self, id: JobId, to: JobStatus) -> Result<JobRecord, DbError> {
        if to == JobStatus::Processing
            && self
                .claim_panics
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            panic!("claim write exploded");
        }
        self.inner.transition(id, to).await
    }

    async fn attach_result(&self, id: JobId, result: &JobResult) -> Result<JobRecord, DbError> {
        if self.reject_results.load(Ordering::SeqCst) {
            return Err(DbError::Query("result column rejected".into()));
        }
        self.inner.attach_result(id, result).await
    }

    async fn attach_error(&self, id: JobId, error: &str) -> Result<JobRecord, DbError> {
        self.inner.attach_error(id, error).await
    }

    async fn read(&self, id: JobId) -> Result<Option<JobRecord>, DbError> {
        self.inner.read(id).await
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, DbError> {
        self.inner.list(filter).await
    }

    async fn count(&self, status: Option<JobStatus>) -> Result<u64, DbError> {
        self.inner.count(status).await
    }
}

/// Queue config with retries fast enough for tests.
pub fn config(capacity: usize, workers: usize) -> QueueConfig {
    QueueConfig::default()
        .with_capacity(capacity)
        .with_workers(workers)
        .with_store_retry(RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        })
}

pub async fn memory_service(capacity: usize, workers: usize) -> JobService<MemoryJobStore> {
    JobService::new(config(capacity, workers), Arc::new(MemoryJobStore::new()))
        .await
        .expect("service starts")
}

pub fn payload(index: u64) -> JobPayload {
    JobPayload::new(json!({ "index": index }))
}

/// Poll `check` every few milliseconds until it holds or five seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Wait until every job is COMPLETED or FAILED and return the final records.
pub async fn wait_terminal<S: JobStore>(service: &JobService<S>, ids: &[JobId]) -> Vec<JobRecord> {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(record) = service.get_status(*id).await.expect("read")
                    && record.status.is_terminal()
                {
                    records.push(record);
                }
            }
            if records.len() == ids.len() {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("jobs did not finish in time")
}
