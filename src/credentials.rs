//! Credential loading from the runtime `.env` file and the process environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::{debug, warn};

/// Environment key holding the Telegram bot token.
pub const TELEGRAM_TOKEN_KEY: &str = "FANCIFIER_TELEGRAM_TOKEN";

/// Keys read from the process environment, overriding the `.env` file.
pub const KNOWN_KEYS: &[&str] = &[
    TELEGRAM_TOKEN_KEY,
    "DEEPSEEK_API_KEY",
    "DEEPSEEK_BASE_URL",
    "DEEPSEEK_MODEL",
];

/// Runtime credentials.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a key-value map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Returns a credential value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns a required, non-blank credential or an error when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is absent or blank.
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .map(|value| value.trim().to_owned())
            .ok_or_else(|| anyhow::anyhow!("missing required credential: {key}"))
    }
}

/// Load credentials from `env_file` (if present) overlaid with the process
/// environment.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub fn load_credentials(env_file: &Path) -> anyhow::Result<Credentials> {
    load_credentials_with(env_file, |key| std::env::var(key).ok())
}

/// Load credentials using a custom environment resolver (for testing).
///
/// # Errors
///
/// Returns an error if the file exists but cannot be parsed.
pub fn load_credentials_with(
    env_file: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Credentials> {
    let mut vars = BTreeMap::new();

    if env_file.exists() {
        warn_if_not_private(env_file);
        let iter = dotenvy::from_path_iter(env_file)
            .with_context(|| format!("failed to read credentials at {}", env_file.display()))?;
        for item in iter {
            let (key, value) = item.with_context(|| {
                format!(
                    "failed to parse key-value entry in credentials file {}",
                    env_file.display()
                )
            })?;
            vars.insert(key, value);
        }
        debug!(path = %env_file.display(), keys = vars.len(), "credentials file loaded");
    }

    for key in KNOWN_KEYS {
        if let Some(value) = env(key) {
            vars.insert((*key).to_owned(), value);
        }
    }

    Ok(Credentials { vars })
}

#[cfg(unix)]
fn warn_if_not_private(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    match fs::metadata(path) {
        Ok(metadata) => {
            let mode = metadata.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                let mode_octal = format!("{mode:o}");
                warn!(
                    path = %path.display(),
                    mode = %mode_octal,
                    "credentials file is readable by other users, expected 0600"
                );
            }
        }
        Err(e) => warn!(path = %path.display(), error = %e, "failed to inspect credentials file"),
    }
}

#[cfg(not(unix))]
fn warn_if_not_private(_path: &Path) {}
