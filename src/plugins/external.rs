//! Subprocess plugins described by JSON manifests.
//!
//! Each `*.json` file in the plugins directory describes one plugin:
//!
//! ```json
//! {"id": "reverse", "title": "Reverse", "command": "rev", "args": [], "timeout_secs": 5}
//! ```
//!
//! The message text is written to the process's stdin; its stdout is the new
//! text. A non-zero exit, a timeout, or non-UTF-8 output fails the transform.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Plugin, PluginContext, PluginError, PluginRegistry};

fn default_timeout_secs() -> u64 {
    10
}

/// On-disk description of an external plugin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginManifest {
    /// Plugin id.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub title: Option<String>,
    /// Executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Wall-clock limit for one transform.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl PluginManifest {
    /// Read and validate a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, invalid JSON, or a blank id or command.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let manifest: PluginManifest = serde_json::from_str(&raw)
            .with_context(|| format!("invalid plugin manifest {}", path.display()))?;
        if manifest.id.trim().is_empty() {
            anyhow::bail!("plugin manifest {} has an empty id", path.display());
        }
        if manifest.command.trim().is_empty() {
            anyhow::bail!("plugin manifest {} has an empty command", path.display());
        }
        Ok(manifest)
    }
}

/// A plugin backed by a child process.
#[derive(Debug, Clone)]
pub struct ExternalPlugin {
    manifest: PluginManifest,
    title: String,
}

impl ExternalPlugin {
    /// Wrap a validated manifest.
    pub fn new(manifest: PluginManifest) -> Self {
        let title = manifest
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| manifest.id.clone());
        Self { manifest, title }
    }

    async fn run(&self, text: &str) -> Result<Vec<u8>, PluginError> {
        let mut child = Command::new(&self.manifest.command)
            .args(&self.manifest.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading stdin closes the pipe early.
            match stdin.write_all(text.as_bytes()).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::Failed(format!(
                "'{}' exited with {}: {}",
                self.manifest.command,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Plugin for ExternalPlugin {
    fn id(&self) -> &str {
        &self.manifest.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    async fn transform(&self, text: &str, context: PluginContext) -> Result<String, PluginError> {
        let limit = Duration::from_secs(self.manifest.timeout_secs);
        debug!(
            plugin_id = %self.manifest.id,
            chat_id = context.chat_id,
            message_id = context.message_id,
            "running external plugin"
        );
        // The child is killed on drop when the timeout fires.
        let stdout = tokio::time::timeout(limit, self.run(text))
            .await
            .map_err(|_| PluginError::Timeout(self.manifest.timeout_secs))??;

        let mut output = String::from_utf8(stdout)
            .map_err(|_| PluginError::Failed("plugin output is not valid UTF-8".to_owned()))?;
        if !text.ends_with('\n') && output.ends_with('\n') {
            output.pop();
        }
        Ok(output)
    }
}

/// Manifest files in `dir`, sorted by path.
fn manifest_paths(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Register every valid manifest found in `dir`; returns how many loaded.
///
/// A missing directory loads nothing. Invalid manifests are skipped with a
/// warning. Manifests load after the built-ins and may replace them.
pub fn load_external_plugins(registry: &mut PluginRegistry, dir: &Path) -> usize {
    let paths = match manifest_paths(dir) {
        Ok(paths) => paths,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "plugins directory not present");
            return 0;
        }
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "failed to list plugins directory");
            return 0;
        }
    };

    let mut loaded: usize = 0;
    for path in paths {
        match PluginManifest::from_file(&path) {
            Ok(manifest) => {
                if registry.contains(&manifest.id) {
                    info!(plugin_id = %manifest.id, path = %path.display(), "external plugin replaces existing id");
                }
                registry.register(Arc::new(ExternalPlugin::new(manifest)));
                loaded = loaded.saturating_add(1);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping invalid plugin manifest"),
        }
    }
    loaded
}
