//! Remote inference over `ssh`.

use std::process::Stdio;
use std::time::{Duration, Instant};

use queue_core::{JobPayload, JobResult};
use serde_json::json;

use crate::processor::{Processor, ProcessorError, ProcessorFuture, index_param, round_secs};

/// Options passed to every ssh invocation.
const SSH_OPTIONS: [&str; 6] = [
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "LogLevel=ERROR",
];

/// Longest slice of command output kept in a job result.
const OUTPUT_TAIL_CHARS: usize = 2_000;

/// Where and how the remote inference script runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// When set, the command is wrapped in `sshpass`; otherwise key auth is assumed.
    pub password: Option<String>,
    pub work_dir: String,
    pub conda_env: String,
    /// Script path relative to `work_dir`; receives the job index as its argument.
    pub script: String,
    pub result_dir: String,
    pub timeout: Duration,
    /// Client binary, `ssh` unless overridden.
    pub ssh_program: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            user: "inference".to_string(),
            password: None,
            work_dir: "/opt/inference".to_string(),
            conda_env: "base".to_string(),
            script: "tools/demo/demo.sh".to_string(),
            result_dir: "/opt/inference/results".to_string(),
            timeout: Duration::from_secs(120),
            ssh_program: "ssh".to_string(),
        }
    }
}

impl RemoteConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Shell line executed on the remote host for one job.
    pub fn remote_command(&self, index: u64) -> String {
        format!(
            "source ~/.bashrc && conda activate {} && cd {} && bash {} {}",
            self.conda_env, self.work_dir, self.script, index
        )
    }

    /// Local program and arguments that run `remote_command` on the host.
    pub fn command_for(&self, index: u64) -> RemoteCommand {
        let mut args: Vec<String> = Vec::new();
        let program = match &self.password {
            Some(password) => {
                args.extend(["-p".to_string(), password.clone(), self.ssh_program.clone()]);
                "sshpass".to_string()
            }
            None => self.ssh_program.clone(),
        };

        args.extend(SSH_OPTIONS.iter().map(|s| s.to_string()));
        args.extend([
            "-p".to_string(),
            self.port.to_string(),
            format!("{}@{}", self.user, self.host),
            self.remote_command(index),
        ]);

        RemoteCommand { program, args }
    }
}

/// A fully resolved local command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Runs the inference script on a remote host through `ssh`.
pub struct RemoteProcessor {
    config: RemoteConfig,
}

impl RemoteProcessor {
    pub fn new(config: RemoteConfig) -> Self {
        Self { config }
    }
}

impl Processor for RemoteProcessor {
    fn name(&self) -> &str {
        "remote"
    }

    fn execute(&self, payload: &JobPayload) -> ProcessorFuture {
        let config = self.config.clone();
        let index = index_param(payload);
        let job_id = payload.id;

        Box::pin(async move {
            let index = index?;
            let command = config.command_for(index);
            tracing::info!(
                %job_id,
                host = %config.host,
                index,
                "Running remote inference"
            );

            let started = Instant::now();
            let mut cmd = tokio::process::Command::new(&command.program);
            cmd.args(&command.args).stdin(Stdio::null()).kill_on_drop(true);

            let output = tokio::time::timeout(config.timeout, cmd.output())
                .await
                .map_err(|_| ProcessorError::Timeout(config.timeout))?
                .map_err(|e| ProcessorError::Spawn(format!("{}: {}", command.program, e)))?;
            let inference_time = round_secs(started.elapsed());

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);

            if !output.status.success() {
                let code = output.status.code().unwrap_or(-1);
                tracing::warn!(%job_id, exit_code = code, stderr = %tail(&stderr), "Remote command failed");
                let message = [stderr.trim(), stdout.trim()]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .map(tail)
                    .unwrap_or_else(|| format!("command exited with status {}", code));
                return Err(ProcessorError::Failed(message));
            }

            Ok(JobResult::with_output(
                "inference complete",
                json!({
                    "success": true,
                    "index": index,
                    "inference_time": inference_time,
                    "result_dir": config.result_dir,
                    "stdout": tail(&stdout),
                }),
            ))
        })
    }
}

fn tail(text: &str) -> String {
    let count = text.chars().count();
    text.chars()
        .skip(count.saturating_sub(OUTPUT_TAIL_CHARS))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ssh_command_uses_key_auth_without_password() {
        let config = RemoteConfig {
            host: "10.0.0.5".into(),
            port: 2222,
            user: "ops".into(),
            conda_env: "vision".into(),
            work_dir: "/srv/model".into(),
            script: "run.sh".into(),
            ..RemoteConfig::default()
        };

        let command = config.command_for(7);
        assert_eq!(command.program, "ssh");
        assert_eq!(&command.args[..6], &SSH_OPTIONS.map(String::from)[..]);
        assert_eq!(
            &command.args[6..],
            &[
                "-p".to_string(),
                "2222".to_string(),
                "ops@10.0.0.5".to_string(),
                "source ~/.bashrc && conda activate vision && cd /srv/model && bash run.sh 7"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn password_wraps_in_sshpass() {
        let command = RemoteConfig::default().with_password("secret").command_for(1);
        assert_eq!(command.program, "sshpass");
        assert_eq!(&command.args[..3], &["-p", "secret", "ssh"]);
    }

    #[tokio::test]
    async fn missing_client_is_a_spawn_error() {
        let processor = RemoteProcessor::new(
            RemoteConfig::default().with_ssh_program("/nonexistent/ssh-client"),
        );
        let err = processor
            .execute(&JobPayload::new(json!({ "index": 1 })))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Spawn(_)), "{err:?}");
    }

    #[tokio::test]
    async fn exit_status_decides_outcome() {
        let ok = RemoteProcessor::new(RemoteConfig::default().with_ssh_program("true"));
        let result = ok
            .execute(&JobPayload::new(json!({ "index": 3 })))
            .await
            .unwrap();
        assert_eq!(result.output.unwrap()["index"], 3);

        let failing = RemoteProcessor::new(RemoteConfig::default().with_ssh_program("false"));
        let err = failing
            .execute(&JobPayload::new(json!({ "index": 3 })))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProcessorError::Failed("command exited with status 1".into())
        );
    }

    #[test]
    fn tail_keeps_the_end() {
        let long = "x".repeat(OUTPUT_TAIL_CHARS) + "end";
        let kept = tail(&long);
        assert_eq!(kept.chars().count(), OUTPUT_TAIL_CHARS);
        assert!(kept.ends_with("end"));
    }
}
