//! Process configuration read from the environment.

use std::str::FromStr;
use std::time::Duration;

use actors::{LocalConfig, ProcessorConfig, RemoteConfig};
use db::DbConfig;
use queue_core::QueueConfig;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}={value}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Queue(#[from] queue_core::ConfigError),
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Everything `jobd` needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub queue: QueueConfig,
    pub database: DbConfig,
    pub processor: ProcessorConfig,
    pub log_format: LogFormat,
    /// Jobs submitted right after startup, for trying the service out.
    pub demo_jobs: u64,
}

impl ServiceConfig {
    /// Build a config from environment variables.
    ///
    /// Queue:
    /// - `MAX_QUEUE_SIZE` (default: `100`)
    /// - `MAX_WORKERS` (default: `2`)
    /// - `TASK_TIMEOUT` seconds per job (default: `120`)
    ///
    /// Processor:
    /// - `MOCK_MODE` (`true`/`false`, default: `true`) selects local inference
    /// - `MOCK_DELAY_MS` simulated inference time (default: `2000`)
    /// - `SSH_HOST`, `SSH_PORT`, `SSH_USER`, `SSH_PASSWORD` (optional)
    /// - `REMOTE_WORK_DIR`, `REMOTE_CONDA_ENV`, `REMOTE_SCRIPT`, `REMOTE_RESULT_DIR`
    ///
    /// Common:
    /// - `DATABASE_URL` (default: `mem://`)
    /// - `LOG_FORMAT` (`pretty`/`json`, default: `pretty`)
    /// - `DEMO_JOBS` (default: `0`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        let defaults = QueueConfig::default();
        let queue = QueueConfig::default()
            .with_capacity(env.parse("MAX_QUEUE_SIZE")?.unwrap_or(defaults.capacity))
            .with_workers(env.parse("MAX_WORKERS")?.unwrap_or(defaults.workers))
            .with_job_timeout(env.parse("TASK_TIMEOUT")?.unwrap_or(defaults.job_timeout_secs));
        queue.validate()?;

        let database = DbConfig::from_endpoint(
            env.get("DATABASE_URL").unwrap_or_else(|| "mem://".to_string()),
        );

        let processor = if env.flag("MOCK_MODE")?.unwrap_or(true) {
            let mut local = LocalConfig::default().with_timeout(queue.job_timeout());
            if let Some(ms) = env.parse::<u64>("MOCK_DELAY_MS")? {
                local = local.with_delay(Duration::from_millis(ms));
            }
            ProcessorConfig::Local(local)
        } else {
            ProcessorConfig::Remote(remote_config(&env, &queue)?)
        };

        let log_format = match env.get("LOG_FORMAT").as_deref() {
            None | Some("pretty") | Some("text") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected pretty|json".to_string(),
                });
            }
        };

        Ok(Self {
            queue,
            database,
            processor,
            log_format,
            demo_jobs: env.parse("DEMO_JOBS")?.unwrap_or(0),
        })
    }
}

fn remote_config<F>(env: &Env<F>, queue: &QueueConfig) -> Result<RemoteConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = RemoteConfig::default();
    Ok(RemoteConfig {
        host: env.get("SSH_HOST").unwrap_or(defaults.host),
        port: env.parse("SSH_PORT")?.unwrap_or(defaults.port),
        user: env.get("SSH_USER").unwrap_or(defaults.user),
        password: env.get("SSH_PASSWORD"),
        work_dir: env.get("REMOTE_WORK_DIR").unwrap_or(defaults.work_dir),
        conda_env: env.get("REMOTE_CONDA_ENV").unwrap_or(defaults.conda_env),
        script: env.get("REMOTE_SCRIPT").unwrap_or(defaults.script),
        result_dir: env.get("REMOTE_RESULT_DIR").unwrap_or(defaults.result_dir),
        timeout: queue.job_timeout(),
        ssh_program: defaults.ssh_program,
    })
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// A set, non-blank variable.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|value| {
                value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    key,
                    reason: e.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn flag(&self, key: &'static str) -> Result<Option<bool>, ConfigError> {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(None),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(Some(true)),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(Some(false)),
            Some(value) => Err(ConfigError::Invalid {
                key,
                value,
                reason: "expected true|false".to_string(),
            }),
        }
    }
}
