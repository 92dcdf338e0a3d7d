//! Event processing, hot reload and daemon lifecycle.
//!
//! The [`EventProcessor`] takes one outgoing-message event through
//! snapshot capture, last-seen bookkeeping, the chat lock, the safeguard, the
//! plugin chain and the edit commit. The [`Daemon`] owns the processor, the
//! config watcher that installs new snapshots, and the in-flight task count
//! used for graceful shutdown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, ConfigWatcher};
use crate::pipeline::PluginPipeline;
use crate::plugins::{build_registry, PluginContext};
use crate::providers::LlmProvider;
use crate::safeguard;
use crate::transport::{OutgoingMessage, Transport};

pub mod chat_state;
pub mod snapshot;

pub use chat_state::ChatStates;
pub use snapshot::{RuntimeSnapshot, SharedRuntime};

/// Default time `shutdown` waits for in-flight events.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

// ── Outcomes ────────────────────────────────────────────────────

/// An edit that dry-run mode logged instead of sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WouldEdit {
    /// Target chat.
    pub chat_id: i64,
    /// Target message.
    pub message_id: i64,
    /// Original text.
    pub before: String,
    /// Text the edit would have set.
    pub after: String,
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Missing ids, empty text, or no plugins configured for the chat.
    Ignored,
    /// The safeguard refused the edit.
    Rejected {
        /// Safeguard reason.
        reason: String,
    },
    /// The plugin chain left the text as it was.
    Unchanged,
    /// Dry-run: nothing was sent.
    DryRun(WouldEdit),
    /// A newer message arrived while the chain ran; the edit was dropped.
    Superseded,
    /// The chain aborted; the original message is untouched.
    Failed {
        /// Plugin that stopped the chain.
        plugin_id: String,
    },
    /// The edit was committed.
    Edited {
        /// Text the message now carries.
        text: String,
    },
    /// The transport refused or lost the edit.
    EditFailed {
        /// Transport error message.
        error: String,
    },
}

// ── Processor ───────────────────────────────────────────────────

/// Switches set at daemon start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Force dry-run regardless of `default_dry_run`.
    pub dry_run: bool,
}

/// Runs events through safeguard, plugin chain and edit commit.
pub struct EventProcessor {
    runtime: Arc<SharedRuntime>,
    chats: ChatStates,
    transport: Arc<dyn Transport>,
    options: ProcessorOptions,
}

impl std::fmt::Debug for EventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventProcessor")
            .field("options", &self.options)
            .field("chats", &self.chats.tracked_chats())
            .finish_non_exhaustive()
    }
}

impl EventProcessor {
    /// Create a processor reading snapshots from `runtime`.
    pub fn new(
        runtime: Arc<SharedRuntime>,
        transport: Arc<dyn Transport>,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            runtime,
            chats: ChatStates::new(),
            transport,
            options,
        }
    }

    /// Snapshot holder shared with the reload path.
    pub fn runtime(&self) -> &Arc<SharedRuntime> {
        &self.runtime
    }

    /// Per-chat locks and last-seen ids.
    pub fn chat_states(&self) -> &ChatStates {
        &self.chats
    }

    /// Process one outgoing-message event to completion.
    ///
    /// The plugin chain comes from the snapshot active when this call starts;
    /// a reload during processing only affects later events.
    pub async fn process(&self, event: OutgoingMessage) -> ProcessOutcome {
        let (Some(chat_id), Some(message_id)) = (event.chat_id, event.message_id) else {
            debug!("event without chat or message id, ignoring");
            return ProcessOutcome::Ignored;
        };
        if event.text.is_empty() {
            debug!(chat_id, message_id, "event without text, ignoring");
            return ProcessOutcome::Ignored;
        }

        let snapshot = self.runtime.current();
        let plugin_order = snapshot.config.plugin_order(chat_id);
        if plugin_order.is_empty() {
            debug!(chat_id, message_id, "chat has no plugins configured");
            return ProcessOutcome::Ignored;
        }

        // Recorded before waiting on the lock so an in-flight edit for an
        // older message in this chat sees it has been superseded.
        self.chats.record_last_seen(chat_id, message_id);

        let lock = self.chats.lock_for(chat_id);
        let _guard = lock.lock().await;

        let verdict = safeguard::evaluate(
            message_id,
            self.chats.last_seen(chat_id),
            &event.timestamp,
            snapshot.config.max_message_age_secs,
        );
        if !verdict.ok {
            info!(chat_id, message_id, reason = %verdict.reason, "edit skipped by safeguard");
            return ProcessOutcome::Rejected {
                reason: verdict.reason,
            };
        }

        let dry_run = self.options.dry_run || snapshot.config.default_dry_run;
        let context = PluginContext {
            chat_id,
            message_id,
            dry_run,
        };
        let run = match PluginPipeline::new(&snapshot.registry)
            .run(&event.text, plugin_order, context)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                error!(
                    chat_id,
                    message_id,
                    plugin_id = %e.plugin_id(),
                    error = %e,
                    "plugin chain failed, message left unchanged"
                );
                return ProcessOutcome::Failed {
                    plugin_id: e.plugin_id().to_owned(),
                };
            }
        };

        if !run.changed() {
            debug!(chat_id, message_id, "plugin chain made no change");
            return ProcessOutcome::Unchanged;
        }

        if dry_run {
            info!(
                chat_id,
                message_id,
                before = %event.text,
                after = %run.text,
                "dry run: would edit message"
            );
            return ProcessOutcome::DryRun(WouldEdit {
                chat_id,
                message_id,
                before: event.text,
                after: run.text,
            });
        }

        if self.chats.last_seen(chat_id) != Some(message_id) {
            info!(chat_id, message_id, "newer message arrived during processing, edit dropped");
            return ProcessOutcome::Superseded;
        }

        match self
            .transport
            .edit(chat_id, message_id, &run.text, snapshot.config.format_hint())
            .await
        {
            Ok(()) => {
                info!(chat_id, message_id, "message edited");
                ProcessOutcome::Edited { text: run.text }
            }
            Err(e) => {
                warn!(chat_id, message_id, error = %e, "edit failed, not retrying");
                ProcessOutcome::EditFailed {
                    error: e.to_string(),
                }
            }
        }
    }
}

// ── Reload ──────────────────────────────────────────────────────

/// Everything needed to (re)build a runtime snapshot.
#[derive(Clone)]
pub struct SnapshotSource {
    /// Config file access.
    pub store: ConfigStore,
    /// Provider handed to `llm_rewrite`.
    pub provider: Arc<dyn LlmProvider>,
    /// Plugin manifests directory used when the config names none.
    pub default_plugins_dir: PathBuf,
}

impl std::fmt::Debug for SnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSource")
            .field("store", &self.store)
            .field("default_plugins_dir", &self.default_plugins_dir)
            .finish_non_exhaustive()
    }
}

impl SnapshotSource {
    /// Load the config and build a matching registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or is invalid.
    pub fn build(&self) -> anyhow::Result<RuntimeSnapshot> {
        let config = self.store.load()?;
        let registry = build_registry(&config, Arc::clone(&self.provider), &self.default_plugins_dir);
        Ok(RuntimeSnapshot::new(config, registry))
    }

    /// Build a fresh snapshot and install it. On error the active snapshot
    /// stays in place.
    ///
    /// # Errors
    ///
    /// Returns the load error.
    pub fn reload_into(&self, runtime: &SharedRuntime) -> anyhow::Result<()> {
        let snapshot = self.build()?;
        info!(
            chats = snapshot.config.chats.len(),
            plugins = snapshot.registry.len(),
            "configuration reloaded"
        );
        runtime.install(snapshot);
        Ok(())
    }
}

// ── Daemon ──────────────────────────────────────────────────────

/// Counts a spawned event task until it finishes.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Cloneable entry point for transports delivering events.
#[derive(Debug, Clone)]
pub struct DaemonHandle {
    processor: Arc<EventProcessor>,
    in_flight: Arc<AtomicUsize>,
}

impl DaemonHandle {
    /// Process `event` on its own task.
    pub fn submit(&self, event: OutgoingMessage) -> JoinHandle<ProcessOutcome> {
        let guard = InFlightGuard::enter(&self.in_flight);
        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
            let outcome = processor.process(event).await;
            drop(guard);
            outcome
        })
    }

    /// Events currently being processed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Processor plus config watcher.
#[derive(Debug)]
pub struct Daemon {
    handle: DaemonHandle,
    watcher: ConfigWatcher,
    shutdown_timeout: Duration,
}

impl Daemon {
    /// Load the initial snapshot and start watching the config file.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial configuration cannot be loaded.
    pub fn start(
        source: SnapshotSource,
        transport: Arc<dyn Transport>,
        options: ProcessorOptions,
    ) -> anyhow::Result<Self> {
        let initial = source.build()?;
        let interval = Duration::from_millis(initial.config.watch_interval_ms);
        info!(
            chats = initial.config.chats.len(),
            plugins = initial.registry.len(),
            dry_run = options.dry_run || initial.config.default_dry_run,
            "daemon starting"
        );

        let runtime = Arc::new(SharedRuntime::new(initial));
        let processor = Arc::new(EventProcessor::new(
            Arc::clone(&runtime),
            transport,
            options,
        ));

        let mut watcher = ConfigWatcher::new(source.store.path(), interval);
        watcher.on_change(Arc::new(move || source.reload_into(&runtime)));
        watcher.start();

        Ok(Self {
            handle: DaemonHandle {
                processor,
                in_flight: Arc::new(AtomicUsize::new(0)),
            },
            watcher,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        })
    }

    /// Override how long `shutdown` waits for in-flight events.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Handle for submitting events.
    pub fn handle(&self) -> DaemonHandle {
        self.handle.clone()
    }

    /// The processor, for direct use and inspection.
    pub fn processor(&self) -> &Arc<EventProcessor> {
        &self.handle.processor
    }

    /// Stop the watcher and wait for in-flight events, up to the timeout.
    ///
    /// Returns how many events were still running when the wait gave up.
    /// Those tasks are cancelled when the runtime shuts down, so their
    /// messages keep the original text.
    pub async fn shutdown(mut self) -> usize {
        self.watcher.stop().await;

        let pending = self.handle.in_flight();
        if pending > 0 {
            info!(
                pending_events = pending,
                timeout_secs = self.shutdown_timeout.as_secs(),
                "waiting for in-flight events"
            );
            let deadline = tokio::time::Instant::now()
                .checked_add(self.shutdown_timeout)
                .unwrap_or_else(tokio::time::Instant::now);

            while self.handle.in_flight() > 0 {
                if tokio::time::Instant::now() >= deadline {
                    let remaining = self.handle.in_flight();
                    warn!(
                        remaining_events = remaining,
                        timeout_secs = self.shutdown_timeout.as_secs(),
                        "shutdown timeout exceeded, cancelling in-flight events without editing"
                    );
                    return remaining;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        info!("daemon stopped");
        0
    }
}
