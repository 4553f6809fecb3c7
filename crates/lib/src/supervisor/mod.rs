//! Background process supervisor: launch validated commands without waiting, capture
//! their output into the registry, and serve it back on request.

mod drain;
mod registry;

pub use registry::{
    unix_now, OutputLine, ProcessExit, ProcessId, ProcessRecord, ProcessRegistry,
    ProcessSnapshot, ProcessSummary, Stream,
};

use crate::config::BackgroundConfig;
use crate::exec::{build_command, validate, Capture, CommandPolicy, ExecutionResult, WorkDirs};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Grace for the reaper task to record an exit it has just collected.
const REAP_SETTLE: Duration = Duration::from_millis(50);

/// Why a pid could not be queried or terminated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("process not found: {0}")]
    NotFound(ProcessId),
    #[error("access denied for process {0}")]
    AccessDenied(ProcessId),
    #[error("process already exited: {0}")]
    Exited(ProcessId),
}

/// Outcome of a background launch: a result stub, and the pid when the process was registered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackgroundLaunch {
    pub result: ExecutionResult,
    pub pid: Option<ProcessId>,
}

pub struct Supervisor {
    policy: Arc<CommandPolicy>,
    dirs: WorkDirs,
    registry: ProcessRegistry,
    launch_check: Duration,
    max_lines: usize,
}

impl Supervisor {
    pub fn new(policy: Arc<CommandPolicy>, dirs: WorkDirs, config: &BackgroundConfig) -> Self {
        Self {
            policy,
            dirs,
            registry: ProcessRegistry::new(),
            launch_check: config.launch_check(),
            max_lines: config.max_lines_per_stream,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Validate and launch `command` in the workspace without waiting for it.
    ///
    /// A process that has already exited non-zero after the launch check counts as a failed
    /// launch and is not registered.
    pub async fn spawn(&self, command: &str) -> BackgroundLaunch {
        let validated = match validate(&self.policy, command) {
            Ok(v) => v,
            Err(reason) => {
                return BackgroundLaunch {
                    result: ExecutionResult::rejected(command, &reason),
                    pid: None,
                }
            }
        };
        let category = validated.category;
        log::info!("launching [{}] in background: {}", category, command);

        let cwd = self.dirs.resolve(None).await;
        let started = Instant::now();
        let failed = |stderr: String, elapsed: Duration| BackgroundLaunch {
            result: ExecutionResult::failed(command, Some(category), stderr, elapsed),
            pid: None,
        };
        let mut child = match build_command(&validated, &cwd).and_then(|mut c| c.spawn()) {
            Ok(child) => child,
            Err(e) => {
                log::error!("background launch failed for {:?}: {}", command, e);
                return failed(format!("launch failed: {}", e), started.elapsed());
            }
        };
        let Some(pid) = child.id() else {
            return failed("process exited before a pid was assigned".to_string(), started.elapsed());
        };

        tokio::time::sleep(self.launch_check).await;
        let mut early_exit = None;
        match child.try_wait() {
            Ok(Some(status)) if !status.success() => {
                let stdout = Capture::start(child.stdout.take()).finish().await;
                let stderr = Capture::start(child.stderr.take()).finish().await;
                let code = status.code().unwrap_or(-1);
                log::warn!("background command exited immediately with {}: {}", code, command);
                return BackgroundLaunch {
                    result: ExecutionResult {
                        success: false,
                        stdout,
                        stderr,
                        return_code: code,
                        elapsed: started.elapsed(),
                        original_command: command.to_string(),
                        category: Some(category),
                    },
                    pid: None,
                };
            }
            Ok(status) => early_exit = status,
            Err(e) => log::warn!("polling pid {} after launch failed: {}", pid, e),
        }

        let record = Arc::new(ProcessRecord::new(pid, command, category, self.max_lines));
        if let Some(status) = early_exit {
            // already reaped by try_wait; the pid may no longer exist
            record.mark_exited(status.code()).await;
        }
        if let Some(old) = self.registry.insert(Arc::clone(&record)).await {
            log::info!("pid {} reused; replacing record for {:?}", pid, old.command);
        }
        if let Some(out) = child.stdout.take() {
            drain::spawn_drain(Arc::clone(&record), Stream::Stdout, out);
        }
        if let Some(err) = child.stderr.take() {
            drain::spawn_drain(Arc::clone(&record), Stream::Stderr, err);
        }
        drain::spawn_reaper(child, record);
        log::info!("background command started with pid {}: {}", pid, command);

        BackgroundLaunch {
            result: ExecutionResult {
                success: true,
                stdout: String::new(),
                stderr: String::new(),
                return_code: 0,
                elapsed: started.elapsed(),
                original_command: command.to_string(),
                category: Some(category),
            },
            pid: Some(pid),
        }
    }

    /// Current output of a background process; `tail` limits lines per stream.
    ///
    /// Records are kept after exit for post-mortem reads, so a reaped pid with a recorded
    /// exit returns its buffers with `running == false` rather than `NotFound`. Only a
    /// process still believed running is checked against the OS.
    pub async fn query(
        &self,
        pid: ProcessId,
        tail: Option<usize>,
    ) -> Result<ProcessSnapshot, LookupError> {
        let record = self
            .registry
            .get(pid)
            .await
            .ok_or(LookupError::NotFound(pid))?;
        if record.exit().await.is_none() {
            if let Err(e) = check_liveness(pid) {
                // the reaper may have collected the child without recording it yet
                tokio::time::sleep(REAP_SETTLE).await;
                if record.exit().await.is_none() {
                    return Err(e);
                }
            }
        }
        Ok(record.snapshot(tail).await)
    }

    /// All tracked processes, sorted by pid.
    pub async fn list(&self) -> Vec<ProcessSummary> {
        let mut out = Vec::new();
        for record in self.registry.list().await {
            out.push(record.summary().await);
        }
        out
    }

    /// Ask the reaper of a tracked, still-running process to kill it. The reaper holds the
    /// unreaped child, so the pid cannot have been recycled. The registry lock is held so
    /// a replacement record cannot be inserted for the pid meanwhile.
    pub async fn terminate(&self, pid: ProcessId) -> Result<(), LookupError> {
        let guard = self.registry.lock().await;
        let record = guard.get(&pid).ok_or(LookupError::NotFound(pid))?;
        if record.exit().await.is_some() {
            return Err(LookupError::Exited(pid));
        }
        record.request_kill();
        log::info!("kill requested for background pid {}", pid);
        Ok(())
    }
}

#[cfg(unix)]
fn to_nix_pid(pid: ProcessId) -> Result<nix::unistd::Pid, LookupError> {
    i32::try_from(pid)
        .map(nix::unistd::Pid::from_raw)
        .map_err(|_| LookupError::NotFound(pid))
}

/// Signal 0: checks existence and permission without delivering anything.
#[cfg(unix)]
fn check_liveness(pid: ProcessId) -> Result<(), LookupError> {
    use nix::errno::Errno;
    match nix::sys::signal::kill(to_nix_pid(pid)?, None) {
        Ok(()) => Ok(()),
        Err(Errno::EPERM) => Err(LookupError::AccessDenied(pid)),
        Err(_) => Err(LookupError::NotFound(pid)),
    }
}

#[cfg(not(unix))]
fn check_liveness(_pid: ProcessId) -> Result<(), LookupError> {
    Ok(())
}
