//! Synchronous executor: validate, spawn the argument vector (never a shell), wait up to
//! the timeout, and return a structured result. Failures never propagate as errors.

use super::policy::CommandPolicy;
use super::result::ExecutionResult;
use super::validate::{validate, ValidatedCommand};
use super::workdir::WorkDirs;
use crate::config::ExecConfig;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How long to wait for pipe readers after the child has exited or been killed.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Build the OS command for a validated argument vector: stdin closed, stdout/stderr piped.
pub(crate) fn build_command(validated: &ValidatedCommand, cwd: &Path) -> std::io::Result<Command> {
    let (program, args) = validated.argv.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty argument vector")
    })?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    Ok(cmd)
}

/// Pipe reader that appends into a shared buffer, so output read before a kill is kept.
pub(crate) struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Capture {
    pub(crate) fn start<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = stream.map(|mut stream| {
            let buf = Arc::clone(&buf);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.lock().await.extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buf, task }
    }

    /// Wait briefly for the reader to hit end-of-stream, then return what was captured.
    pub(crate) async fn finish(mut self) -> String {
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(OUTPUT_GRACE, &mut task).await.is_err() {
                log::debug!("output reader still open after grace period; using partial output");
                task.abort();
            }
        }
        let buf = self.buf.lock().await;
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Runs validated commands to completion with a bounded wall-clock timeout.
#[derive(Debug, Clone)]
pub struct Executor {
    policy: Arc<CommandPolicy>,
    dirs: WorkDirs,
    timeout: Duration,
}

impl Executor {
    pub fn new(policy: Arc<CommandPolicy>, dirs: WorkDirs, timeout: Duration) -> Self {
        Self {
            policy,
            dirs,
            timeout,
        }
    }

    pub fn from_config(policy: Arc<CommandPolicy>, exec: &ExecConfig) -> Self {
        Self::new(policy, WorkDirs::from_config(exec), exec.timeout())
    }

    /// Validate and run `command`, in `working_dir` when it exists.
    pub async fn execute(&self, command: &str, working_dir: Option<&Path>) -> ExecutionResult {
        let validated = match validate(&self.policy, command) {
            Ok(v) => v,
            Err(reason) => return ExecutionResult::rejected(command, &reason),
        };
        let category = Some(validated.category);
        log::info!("executing [{}]: {}", validated.category, command);

        let cwd = self.dirs.resolve(working_dir).await;
        let started = Instant::now();
        let mut child = match build_command(&validated, &cwd).and_then(|mut c| c.kill_on_drop(true).spawn()) {
            Ok(child) => child,
            Err(e) => {
                log::error!("launch failed for {:?}: {}", command, e);
                return ExecutionResult::failed(
                    command,
                    category,
                    format!("launch failed: {}", e),
                    started.elapsed(),
                );
            }
        };
        let stdout = Capture::start(child.stdout.take());
        let stderr = Capture::start(child.stderr.take());

        match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let stdout = stdout.finish().await;
                let stderr = stderr.finish().await;
                let code = status.code().unwrap_or(-1);
                log::info!("command finished with code {}: {}", code, command);
                ExecutionResult {
                    success: status.success(),
                    stdout,
                    stderr,
                    return_code: code,
                    elapsed: started.elapsed(),
                    original_command: command.to_string(),
                    category,
                }
            }
            Ok(Err(e)) => {
                log::error!("waiting for {:?} failed: {}", command, e);
                let mut result = ExecutionResult::failed(
                    command,
                    category,
                    format!("wait failed: {}", e),
                    started.elapsed(),
                );
                result.stdout = stdout.finish().await;
                result
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    log::warn!("killing timed out command {:?} failed: {}", command, e);
                }
                log::warn!("command timed out after {:?}: {}", self.timeout, command);
                let mut result = ExecutionResult::failed(
                    command,
                    category,
                    format!("timeout after {}s", self.timeout.as_secs_f64()),
                    started.elapsed(),
                );
                result.stdout = stdout.finish().await;
                let _ = stderr.finish().await;
                result
            }
        }
    }
}
