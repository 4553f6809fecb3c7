//! Initialize the configuration directory: create ~/.warden, a default config, and the
//! sandbox workspace.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};

/// Create the config directory and a default `config.json` if missing (never overwrites).
/// Returns the config directory and the effective config.
pub fn init_config_dir(config_path: &Path) -> Result<(PathBuf, Config)> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    let config = if !config_path.exists() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).context("serializing default config")?;
        std::fs::write(config_path, json)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
        config
    } else {
        log::debug!("config already exists at {}, keeping it", config_path.display());
        config::load_config(Some(config_path.to_path_buf()))?.0
    };

    Ok((config_dir.to_path_buf(), config))
}

/// Create the configured sandbox workspace if it does not exist.
pub fn ensure_workspace(config: &Config) -> Result<PathBuf> {
    let workspace = &config.exec.workspace;
    if !workspace.exists() {
        std::fs::create_dir_all(workspace)
            .with_context(|| format!("creating workspace directory {}", workspace.display()))?;
        log::info!("created workspace directory at {}", workspace.display());
    }
    Ok(workspace.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("warden-init-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn creates_missing_config_without_overwriting_later() {
        let dir = temp_dir();
        let path = dir.join("nested").join("config.json");
        let (out, config) = init_config_dir(&path).unwrap();
        assert_eq!(out, dir.join("nested"));
        assert_eq!(config.gateway.port, 8080);
        let written: Config =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.gateway.port, 8080);

        std::fs::write(&path, r#"{"gateway":{"port":9999}}"#).unwrap();
        let (_, config) = init_config_dir(&path).unwrap();
        assert_eq!(config.gateway.port, 9999);
        assert!(std::fs::read_to_string(&path).unwrap().contains("9999"));
    }

    #[test]
    fn ensure_workspace_creates_directory() {
        let dir = temp_dir();
        let mut config = Config::default();
        config.exec.workspace = dir.join("workspace");
        assert_eq!(ensure_workspace(&config).unwrap(), dir.join("workspace"));
        assert!(dir.join("workspace").is_dir());
        // idempotent
        ensure_workspace(&config).unwrap();
    }
}
