//! Working directory resolution: requested dir if it exists, else the sandbox
//! workspace (created on demand), else the fallback dir, else the current dir.

use crate::config::ExecConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct WorkDirs {
    workspace: PathBuf,
    fallback: PathBuf,
}

impl WorkDirs {
    pub fn new(workspace: impl Into<PathBuf>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            fallback: fallback.into(),
        }
    }

    pub fn from_config(exec: &ExecConfig) -> Self {
        Self::new(exec.workspace.clone(), exec.fallback_dir.clone())
    }

    /// Pick the directory a command runs in.
    pub async fn resolve(&self, requested: Option<&Path>) -> PathBuf {
        if let Some(dir) = requested {
            if tokio::fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false) {
                return dir.to_path_buf();
            }
            log::debug!("working dir {} does not exist, using workspace", dir.display());
        }
        match tokio::fs::create_dir_all(&self.workspace).await {
            Ok(()) => return self.workspace.clone(),
            Err(e) => log::warn!(
                "cannot create workspace {}: {}; falling back to {}",
                self.workspace.display(),
                e,
                self.fallback.display()
            ),
        }
        if self.fallback.is_dir() {
            self.fallback.clone()
        } else {
            PathBuf::from(".")
        }
    }
}
