//! TOML file persistence for [`AppConfig`].

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use tracing::{debug, info};

use super::AppConfig;

/// Reads and writes the config file at one path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store backed by `path`. Nothing is touched until `load` or `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the config. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load(&self) -> anyhow::Result<AppConfig> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "config file not found, using defaults");
            return Ok(AppConfig::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read config file {}", self.path.display()))?;
        let config = AppConfig::from_toml(&contents)
            .with_context(|| format!("invalid config file {}", self.path.display()))?;
        info!(path = %self.path.display(), chats = config.chats.len(), "config loaded");
        Ok(config)
    }

    /// Validate and write `config`, replacing the file atomically.
    ///
    /// The content goes to a sibling temp file first and is then renamed over
    /// the target, so a concurrent reader never sees a partial file.
    ///
    /// # Errors
    ///
    /// Returns an error on validation, serialization or I/O failure.
    pub fn save(&self, config: &AppConfig) -> anyhow::Result<()> {
        config.validate()?;
        let rendered = toml::to_string_pretty(config).context("failed to serialize config")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut tmp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "config.toml".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp_path, rendered)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        info!(path = %self.path.display(), chats = config.chats.len(), "config saved");
        Ok(())
    }

    /// Last modification time of the file.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, including `NotFound`.
    pub fn modified(&self) -> std::io::Result<SystemTime> {
        std::fs::metadata(&self.path)?.modified()
    }
}
