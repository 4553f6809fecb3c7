//! Process registry: pid -> record of a background process and its captured output.
//!
//! Records are inserted on launch, appended to by the drain tasks, and never removed,
//! so output stays readable after the process exits.

use crate::exec::CommandCategory;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock, RwLockReadGuard};

/// OS-assigned process identifier.
pub type ProcessId = u32;

/// Seconds since the Unix epoch, millisecond precision.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        })
    }
}

/// One captured line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputLine {
    pub timestamp: f64,
    pub text: String,
}

/// Append-only line buffer with a size cap. Lines past the cap are counted, not stored.
#[derive(Debug, Default)]
struct OutputBuffer {
    lines: Vec<OutputLine>,
    dropped: u64,
}

impl OutputBuffer {
    fn push(&mut self, line: OutputLine, cap: usize) {
        if self.lines.len() < cap {
            self.lines.push(line);
        } else {
            self.dropped += 1;
        }
    }

    fn tail(&self, n: Option<usize>) -> Vec<OutputLine> {
        let start = n.map_or(0, |n| self.lines.len().saturating_sub(n));
        self.lines[start..].to_vec()
    }
}

/// Exit status recorded by the reaper task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    /// None when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub finished_at: f64,
}

/// A background process and its output buffers.
#[derive(Debug)]
pub struct ProcessRecord {
    pub pid: ProcessId,
    pub command: String,
    pub category: CommandCategory,
    pub started_at: f64,
    max_lines: usize,
    stdout: RwLock<OutputBuffer>,
    stderr: RwLock<OutputBuffer>,
    exit: RwLock<Option<ProcessExit>>,
    /// Kill requests for the reaper task, which owns the child handle.
    kill: Notify,
}

/// Point-in-time view of a record: a prefix of each buffer as of the query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub pid: ProcessId,
    pub command: String,
    pub category: CommandCategory,
    pub running: bool,
    pub exit_code: Option<i32>,
    pub finished_at: Option<f64>,
    pub stdout: Vec<OutputLine>,
    pub stderr: Vec<OutputLine>,
    pub dropped_stdout_lines: u64,
    pub dropped_stderr_lines: u64,
}

/// Listing entry (no output).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSummary {
    pub pid: ProcessId,
    pub command: String,
    pub category: CommandCategory,
    pub running: bool,
    pub exit_code: Option<i32>,
    pub started_at: f64,
    pub finished_at: Option<f64>,
}

impl ProcessRecord {
    pub fn new(
        pid: ProcessId,
        command: impl Into<String>,
        category: CommandCategory,
        max_lines: usize,
    ) -> Self {
        Self {
            pid,
            command: command.into(),
            category,
            started_at: unix_now(),
            max_lines,
            stdout: RwLock::new(OutputBuffer::default()),
            stderr: RwLock::new(OutputBuffer::default()),
            exit: RwLock::new(None),
            kill: Notify::new(),
        }
    }

    fn buffer(&self, stream: Stream) -> &RwLock<OutputBuffer> {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }

    /// Append a line to one stream, stamped with the current time.
    pub async fn append(&self, stream: Stream, text: impl Into<String>) {
        let line = OutputLine {
            timestamp: unix_now(),
            text: text.into(),
        };
        self.buffer(stream).write().await.push(line, self.max_lines);
    }

    pub async fn mark_exited(&self, exit_code: Option<i32>) {
        *self.exit.write().await = Some(ProcessExit {
            exit_code,
            finished_at: unix_now(),
        });
    }

    pub async fn exit(&self) -> Option<ProcessExit> {
        *self.exit.read().await
    }

    /// Ask the reaper to kill the child. The permit is kept if the reaper is not waiting yet.
    pub(crate) fn request_kill(&self) {
        self.kill.notify_one();
    }

    pub(crate) async fn kill_requested(&self) {
        self.kill.notified().await;
    }

    /// Current buffers, optionally only the last `tail` lines per stream.
    pub async fn snapshot(&self, tail: Option<usize>) -> ProcessSnapshot {
        let exit = self.exit().await;
        let (stdout, dropped_stdout_lines) = {
            let b = self.stdout.read().await;
            (b.tail(tail), b.dropped)
        };
        let (stderr, dropped_stderr_lines) = {
            let b = self.stderr.read().await;
            (b.tail(tail), b.dropped)
        };
        ProcessSnapshot {
            pid: self.pid,
            command: self.command.clone(),
            category: self.category,
            running: exit.is_none(),
            exit_code: exit.and_then(|e| e.exit_code),
            finished_at: exit.map(|e| e.finished_at),
            stdout,
            stderr,
            dropped_stdout_lines,
            dropped_stderr_lines,
        }
    }

    pub async fn summary(&self) -> ProcessSummary {
        let exit = self.exit().await;
        ProcessSummary {
            pid: self.pid,
            command: self.command.clone(),
            category: self.category,
            running: exit.is_none(),
            exit_code: exit.and_then(|e| e.exit_code),
            started_at: self.started_at,
            finished_at: exit.map(|e| e.finished_at),
        }
    }
}

/// Shared registry of background processes, keyed by pid.
#[derive(Clone)]
pub struct ProcessRegistry {
    inner: Arc<RwLock<HashMap<ProcessId, Arc<ProcessRecord>>>>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record; returns the record it replaced when the OS reused a pid.
    pub async fn insert(&self, record: Arc<ProcessRecord>) -> Option<Arc<ProcessRecord>> {
        self.inner.write().await.insert(record.pid, record)
    }

    pub async fn get(&self, pid: ProcessId) -> Option<Arc<ProcessRecord>> {
        self.inner.read().await.get(&pid).cloned()
    }

    /// All records, sorted by pid.
    pub async fn list(&self) -> Vec<Arc<ProcessRecord>> {
        let mut records: Vec<_> = self.inner.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.pid);
        records
    }

    /// Hold the registry read lock (inserts wait) while acting on a live record.
    pub(crate) async fn lock(&self) -> RwLockReadGuard<'_, HashMap<ProcessId, Arc<ProcessRecord>>> {
        self.inner.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(max_lines: usize) -> ProcessRecord {
        ProcessRecord::new(42, "ping -c 3 127.0.0.1", CommandCategory::Reconnaissance, max_lines)
    }

    #[tokio::test]
    async fn appends_preserve_order_per_stream() {
        let r = record(100);
        r.append(Stream::Stdout, "one").await;
        r.append(Stream::Stderr, "warn").await;
        r.append(Stream::Stdout, "two").await;
        let snap = r.snapshot(None).await;
        let out: Vec<_> = snap.stdout.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(out, vec!["one", "two"]);
        assert_eq!(snap.stderr.len(), 1);
        assert!(snap.stdout[0].timestamp <= snap.stdout[1].timestamp);
        assert!(snap.running);
    }

    #[tokio::test]
    async fn tail_returns_last_lines() {
        let r = record(100);
        for i in 0..5 {
            r.append(Stream::Stdout, format!("line {}", i)).await;
        }
        let snap = r.snapshot(Some(2)).await;
        let out: Vec<_> = snap.stdout.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(out, vec!["line 3", "line 4"]);
        assert_eq!(r.snapshot(Some(50)).await.stdout.len(), 5);
        assert!(r.snapshot(Some(0)).await.stdout.is_empty());
    }

    #[tokio::test]
    async fn cap_counts_dropped_lines_without_removing_stored_ones() {
        let r = record(2);
        for i in 0..5 {
            r.append(Stream::Stdout, format!("line {}", i)).await;
        }
        let snap = r.snapshot(None).await;
        let out: Vec<_> = snap.stdout.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(out, vec!["line 0", "line 1"]);
        assert_eq!(snap.dropped_stdout_lines, 3);
        assert_eq!(snap.dropped_stderr_lines, 0);
    }

    #[tokio::test]
    async fn exit_is_reflected_in_snapshot_and_summary() {
        let r = record(10);
        assert_eq!(r.snapshot(None).await.finished_at, None);
        assert_eq!(r.summary().await.finished_at, None);
        r.mark_exited(Some(3)).await;
        let snap = r.snapshot(None).await;
        assert!(!snap.running);
        assert_eq!(snap.exit_code, Some(3));
        let finished = snap.finished_at.expect("finish time recorded");
        assert!(finished >= r.started_at);
        let summary = r.summary().await;
        assert!(!summary.running);
        assert_eq!(summary.exit_code, Some(3));
        assert_eq!(summary.finished_at, Some(finished));
    }

    #[tokio::test]
    async fn registry_insert_get_list() {
        let reg = ProcessRegistry::new();
        assert!(reg.list().await.is_empty());
        reg.insert(Arc::new(ProcessRecord::new(7, "id", CommandCategory::Basic, 10))).await;
        reg.insert(Arc::new(ProcessRecord::new(3, "w", CommandCategory::Basic, 10))).await;
        assert_eq!(reg.list().await.len(), 2);
        assert_eq!(reg.get(7).await.map(|r| r.command.clone()), Some("id".to_string()));
        assert!(reg.get(8).await.is_none());
        let pids: Vec<_> = reg.list().await.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![3, 7]);

        let replaced = reg
            .insert(Arc::new(ProcessRecord::new(7, "uptime", CommandCategory::Basic, 10)))
            .await;
        assert_eq!(replaced.map(|r| r.command.clone()), Some("id".to_string()));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let snap = ProcessSnapshot {
            pid: 1,
            command: "id".into(),
            category: CommandCategory::Basic,
            running: false,
            exit_code: Some(0),
            finished_at: Some(2.0),
            stdout: vec![OutputLine {
                timestamp: 1.5,
                text: "uid=0".into(),
            }],
            stderr: Vec::new(),
            dropped_stdout_lines: 0,
            dropped_stderr_lines: 0,
        };
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["exitCode"], 0);
        assert_eq!(v["stdout"][0]["text"], "uid=0");
        assert_eq!(v["droppedStdoutLines"], 0);
        assert_eq!(v["finishedAt"], 2.0);
        assert_eq!(v["category"], "basic");
    }
}
