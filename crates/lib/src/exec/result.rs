//! Structured outcome of one command execution (synchronous run, or a background launch).

use super::policy::CommandCategory;
use super::validate::PolicyRejection;
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Completed or failed attempt. Never a partial state for synchronous runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; -1 for rejections, launch failures, and timeouts.
    pub return_code: i32,
    #[serde(rename = "executionTime", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    #[serde(rename = "command")]
    pub original_command: String,
    pub category: Option<CommandCategory>,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl ExecutionResult {
    /// Result for a command refused by the validator (nothing was spawned).
    pub fn rejected(command: &str, reason: &PolicyRejection) -> Self {
        Self::failed(command, None, reason.to_string(), Duration::ZERO)
    }

    /// Failure before or around the process (launch error, timeout, wait error).
    pub fn failed(
        command: &str,
        category: Option<CommandCategory>,
        stderr: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            return_code: -1,
            elapsed,
            original_command: command.to_string(),
            category,
        }
    }
}
