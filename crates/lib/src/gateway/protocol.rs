//! Gateway HTTP wire types (request bodies and response payloads).

use crate::exec::ExecutionResult;
use crate::supervisor::{ProcessId, ProcessSnapshot};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Body of `POST /execute`. `command` is optional here so a missing command maps to 400.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default, alias = "working_dir")]
    pub working_dir: Option<PathBuf>,
}

/// Body of `POST /execute/background`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackgroundRequest {
    #[serde(default)]
    pub command: Option<String>,
}

/// Query string of `GET /background/{pid}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputQuery {
    /// Only the last N lines per stream.
    pub tail: Option<usize>,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: f64,
    pub message: String,
}

/// Response of `POST /execute/background`. `result` is only present on failure.
#[derive(Debug, Clone, Serialize)]
pub struct BackgroundResponse {
    pub success: bool,
    #[serde(rename = "PID")]
    pub pid: Option<ProcessId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
}

/// Response of `GET /background/{pid}`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub success: bool,
    pub process: ProcessSnapshot,
}

/// Error body for non-200 responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}
