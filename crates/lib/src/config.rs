//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.warden/config.json`). Every section is
//! optional; a missing file yields the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Synchronous executor and working directory settings.
    #[serde(default)]
    pub exec: ExecConfig,

    /// Background process supervisor settings.
    #[serde(default)]
    pub background: BackgroundConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1"). There is no auth; non-loopback binds are logged.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Executor settings: timeout and the working directories commands run in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecConfig {
    /// Wall-clock limit for synchronous commands, in seconds (default 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sandbox workspace; used when no (existing) working directory is supplied. Created on demand.
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Used when the workspace cannot be created.
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: PathBuf,
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_workspace() -> PathBuf {
    PathBuf::from("/home/pentest/workspace")
}

fn default_fallback_dir() -> PathBuf {
    PathBuf::from("/home/pentest")
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            workspace: default_workspace(),
            fallback_dir: default_fallback_dir(),
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Background supervisor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundConfig {
    /// Delay before checking a new process for immediate failure (default 100 ms).
    #[serde(default = "default_launch_check_ms")]
    pub launch_check_ms: u64,

    /// Lines kept per stream; later lines are counted as dropped (default 10000).
    #[serde(default = "default_max_lines")]
    pub max_lines_per_stream: usize,
}

fn default_launch_check_ms() -> u64 {
    100
}

fn default_max_lines() -> usize {
    10_000
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            launch_check_ms: default_launch_check_ms(),
            max_lines_per_stream: default_max_lines(),
        }
    }
}

impl BackgroundConfig {
    pub fn launch_check(&self) -> Duration {
        Duration::from_millis(self.launch_check_ms)
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("WARDEN_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".warden").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path (or WARDEN_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.gateway.port, 8080);
        assert_eq!(c.gateway.bind, "127.0.0.1");
        assert_eq!(c.exec.timeout(), Duration::from_secs(120));
        assert_eq!(c.exec.workspace, PathBuf::from("/home/pentest/workspace"));
        assert_eq!(c.background.launch_check(), Duration::from_millis(100));
        assert_eq!(c.background.max_lines_per_stream, 10_000);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: Config =
            serde_json::from_str(r#"{"gateway":{"port":9000},"exec":{"timeoutSecs":5}}"#).unwrap();
        assert_eq!(c.gateway.port, 9000);
        assert_eq!(c.gateway.bind, "127.0.0.1");
        assert_eq!(c.exec.timeout_secs, 5);
        assert_eq!(c.exec.fallback_dir, PathBuf::from("/home/pentest"));
        assert_eq!(c.background.max_lines_per_stream, 10_000);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let path = std::env::temp_dir()
            .join(format!("warden-config-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.gateway.port, 8080);
    }

    #[test]
    fn load_invalid_json_is_an_error() {
        let dir = std::env::temp_dir().join(format!("warden-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_config(Some(path)).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing config"));
    }

    #[test]
    fn loopback_binds() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(!is_loopback_bind("0.0.0.0"));
    }
}
