//! Processor trait and the built-in processors.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use queue_core::{JobPayload, JobResult};
use serde_json::json;

use crate::remote::{RemoteConfig, RemoteProcessor};

/// Result type for processors.
pub type ProcessorResult = Result<JobResult, ProcessorError>;

/// Future type for async processors.
pub type ProcessorFuture = Pin<Box<dyn Future<Output = ProcessorResult> + Send>>;

/// Errors a processor may report for a single job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to start command: {0}")]
    Spawn(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// Performs the actual work for one job.
///
/// Workers call `execute` concurrently from several tasks, so implementations
/// must be `Sync` and do their own synchronization. The returned future may
/// run for minutes; enforcing an upper bound is up to the processor.
pub trait Processor: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Process a payload and return the result.
    fn execute(&self, payload: &JobPayload) -> ProcessorFuture;
}

/// A simple function-based processor.
pub struct FnProcessor<F>
where
    F: Fn(&JobPayload) -> ProcessorFuture + Send + Sync + 'static,
{
    name: String,
    handler: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(&JobPayload) -> ProcessorFuture + Send + Sync + 'static,
{
    /// Create a new function-based processor.
    pub fn new(name: impl Into<String>, handler: F) -> Self {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<F> Processor for FnProcessor<F>
where
    F: Fn(&JobPayload) -> ProcessorFuture + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, payload: &JobPayload) -> ProcessorFuture {
        (self.handler)(payload)
    }
}

/// Read the `index` parameter shared by the inference processors.
///
/// A missing index means 0; anything other than a non-negative integer is
/// rejected.
pub(crate) fn index_param(payload: &JobPayload) -> Result<u64, ProcessorError> {
    match payload.params.get("index") {
        None => Ok(0),
        Some(value) => value.as_u64().ok_or_else(|| {
            ProcessorError::InvalidPayload(format!("index must be a non-negative integer, got {}", value))
        }),
    }
}

/// Settings for [`LocalProcessor`].
#[derive(Debug, Clone, PartialEq)]
pub struct LocalConfig {
    /// Simulated inference time per job.
    pub delay: Duration,
    /// Upper bound per job.
    pub timeout: Duration,
    /// Directory reported back in results.
    pub result_dir: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            timeout: Duration::from_secs(120),
            result_dir: "./results".to_string(),
        }
    }
}

impl LocalConfig {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Runs inference in-process.
///
/// The model itself lives outside this repository, so the computation is a
/// timed stand-in that produces a result of the same shape as the remote run.
pub struct LocalProcessor {
    config: LocalConfig,
}

impl LocalProcessor {
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }
}

impl Processor for LocalProcessor {
    fn name(&self) -> &str {
        "local"
    }

    fn execute(&self, payload: &JobPayload) -> ProcessorFuture {
        let config = self.config.clone();
        let index = index_param(payload);
        let job_id = payload.id;

        Box::pin(async move {
            let index = index?;
            tracing::info!(%job_id, index, "Running local inference");

            let started = Instant::now();
            tokio::time::timeout(config.timeout, tokio::time::sleep(config.delay))
                .await
                .map_err(|_| ProcessorError::Timeout(config.timeout))?;
            let inference_time = round_secs(started.elapsed());

            Ok(JobResult::with_output(
                "inference complete",
                json!({
                    "success": true,
                    "index": index,
                    "inference_time": inference_time,
                    "result_dir": config.result_dir,
                }),
            ))
        })
    }
}

/// Seconds with two decimals, the precision results report.
pub(crate) fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

/// Which processor a process runs with, chosen once at startup.
#[derive(Debug, Clone)]
pub enum ProcessorConfig {
    Local(LocalConfig),
    Remote(RemoteConfig),
}

/// Build the processor selected by configuration.
pub fn build_processor(config: &ProcessorConfig) -> Arc<dyn Processor> {
    match config {
        ProcessorConfig::Local(local) => Arc::new(LocalProcessor::new(local.clone())),
        ProcessorConfig::Remote(remote) => Arc::new(RemoteProcessor::new(remote.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_processor_reports_index() {
        let processor = LocalProcessor::new(LocalConfig::default().with_delay(Duration::from_millis(5)));
        let payload = JobPayload::new(json!({ "index": 12 }));

        let result = processor.execute(&payload).await.unwrap();
        let output = result.output.unwrap();
        assert_eq!(output["index"], 12);
        assert_eq!(output["success"], true);
    }

    #[tokio::test]
    async fn local_processor_enforces_timeout() {
        let processor = LocalProcessor::new(
            LocalConfig::default()
                .with_delay(Duration::from_secs(5))
                .with_timeout(Duration::from_millis(10)),
        );
        let payload = JobPayload::new(json!({}));

        let err = processor.execute(&payload).await.unwrap_err();
        assert_eq!(err, ProcessorError::Timeout(Duration::from_millis(10)));
    }

    #[test]
    fn index_must_be_an_unsigned_integer() {
        assert_eq!(index_param(&JobPayload::new(json!({}))), Ok(0));
        assert_eq!(index_param(&JobPayload::new(json!({ "index": 4 }))), Ok(4));
        assert!(matches!(
            index_param(&JobPayload::new(json!({ "index": "four" }))),
            Err(ProcessorError::InvalidPayload(_))
        ));
    }
}
