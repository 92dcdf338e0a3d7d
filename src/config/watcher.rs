//! Config file mtime poller driving hot reload.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback invoked after the config file changed.
pub type ReloadCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Polls a file's mtime and fires callbacks when it increases.
///
/// `Stopped` until [`start`](Self::start), `Running` until
/// [`stop`](Self::stop). Errors never end the loop: a missing or unreadable
/// file is retried on the next tick and a failing callback is only logged.
pub struct ConfigWatcher {
    path: PathBuf,
    interval: Duration,
    callbacks: Vec<ReloadCallback>,
    running: Option<Running>,
}

struct Running {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("path", &self.path)
            .field("interval", &self.interval)
            .field("callbacks", &self.callbacks.len())
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl ConfigWatcher {
    /// Watcher for `path`, polling every `interval` (clamped to at least 10ms).
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval: interval.max(Duration::from_millis(10)),
            callbacks: Vec::new(),
            running: None,
        }
    }

    /// Register a callback. Callbacks run in registration order.
    ///
    /// Only callbacks registered before [`start`](Self::start) are used by
    /// that run.
    pub fn on_change(&mut self, callback: ReloadCallback) {
        self.callbacks.push(callback);
    }

    /// Whether the polling task is active.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn the polling task. No-op when already running.
    ///
    /// The current mtime (if any) is recorded immediately so an unchanged
    /// file does not trigger a reload.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let initial = observe(&self.path);
        let handle = tokio::spawn(poll_loop(
            self.path.clone(),
            self.interval,
            self.callbacks.clone(),
            initial,
            shutdown_rx,
        ));
        info!(
            path = %self.path.display(),
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "config watcher started"
        );
        self.running = Some(Running {
            shutdown_tx,
            handle,
        });
    }

    /// Signal the polling task and wait for it to exit.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.handle.await {
            warn!(error = %e, "config watcher task ended abnormally");
        }
        info!("config watcher stopped");
    }
}

fn observe(path: &Path) -> Option<SystemTime> {
    match std::fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(mtime) => Some(mtime),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not present");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to stat config file");
            None
        }
    }
}

async fn poll_loop(
    path: PathBuf,
    interval: Duration,
    callbacks: Vec<ReloadCallback>,
    mut last_mtime: Option<SystemTime>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the first immediate tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(current) = observe(&path) else {
                    continue;
                };
                match last_mtime {
                    None => {
                        last_mtime = Some(current);
                        info!(
                            path = %path.display(),
                            "config file appeared; it applies from its next change or a restart"
                        );
                    }
                    Some(previous) if current > previous => {
                        last_mtime = Some(current);
                        info!(path = %path.display(), "config file changed, reloading");
                        fire(&callbacks);
                    }
                    Some(_) => {}
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

fn fire(callbacks: &[ReloadCallback]) {
    for (index, callback) in callbacks.iter().enumerate() {
        if let Err(e) = callback() {
            warn!(callback = index, error = %e, "config reload callback failed, keeping previous configuration");
        }
    }
}
