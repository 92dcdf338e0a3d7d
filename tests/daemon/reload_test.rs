//! Snapshot swaps during and between events.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use fancifier::config::{ConfigStore, ConfigWatcher};
use fancifier::daemon::{Daemon, ProcessOutcome, ProcessorOptions, RuntimeSnapshot, SnapshotSource};
use fancifier::plugins::Plugin;
use fancifier::providers::{LlmProvider, LlmRequest};
use fancifier::transport::OutgoingMessage;

use crate::support::{chat, config, processor, registry, GatedPlugin, RecordingTransport, SuffixPlugin};

fn event(chat_id: i64, message_id: i64, text: &str) -> OutgoingMessage {
    OutgoingMessage::new(chat_id, message_id, text, Utc::now())
}

struct EchoProvider;

#[async_trait::async_trait]
impl LlmProvider for EchoProvider {
    async fn rewrite(&self, request: LlmRequest) -> String {
        request.text
    }
}

#[tokio::test]
async fn reload_mid_event_keeps_the_captured_chain() {
    let transport = RecordingTransport::new();
    let gated = GatedPlugin::new("gated", "+old");
    let extra: Vec<Arc<dyn Plugin>> = vec![gated.clone()];
    let processor = processor(
        config(vec![chat(100, &["gated"])]),
        registry(extra),
        Arc::clone(&transport),
        false,
    );

    let in_flight = tokio::spawn({
        let processor = Arc::clone(&processor);
        async move { processor.process(event(100, 1, "a")).await }
    });
    gated.entered.notified().await;

    let new_plugins: Vec<Arc<dyn Plugin>> = vec![Arc::new(SuffixPlugin("fresh", "+new"))];
    processor.runtime().install(RuntimeSnapshot::new(
        config(vec![chat(100, &["fresh"])]),
        registry(new_plugins),
    ));

    gated.open();
    assert_eq!(
        in_flight.await.expect("in-flight task"),
        ProcessOutcome::Edited {
            text: "a+old".to_owned()
        }
    );

    assert_eq!(
        processor.process(event(100, 2, "b")).await,
        ProcessOutcome::Edited {
            text: "b+new".to_owned()
        }
    );
}

#[tokio::test]
async fn watcher_reload_applies_to_next_event() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");
    let store = ConfigStore::new(&config_path);

    let mut initial = config(vec![chat(100, &["every_second_upper"])]);
    initial.watch_interval_ms = 20;
    store.save(&initial).expect("save initial config");

    let source = SnapshotSource {
        store: store.clone(),
        provider: Arc::new(EchoProvider),
        default_plugins_dir: dir.path().join("plugins"),
    };
    let transport = RecordingTransport::new();
    let daemon = Daemon::start(source, transport.clone(), ProcessorOptions::default())
        .expect("daemon should start");
    let handle = daemon.handle();

    let outcome = handle
        .submit(event(100, 1, "hello"))
        .await
        .expect("event task");
    assert_eq!(
        outcome,
        ProcessOutcome::Edited {
            text: "hElLo".to_owned()
        }
    );

    let mut updated = initial.clone();
    updated.chats = vec![chat(100, &[])];
    store.save(&updated).expect("save updated config");
    let file = std::fs::File::options()
        .write(true)
        .open(&config_path)
        .expect("open config");
    file.set_modified(std::time::SystemTime::now() + Duration::from_secs(5))
        .expect("bump mtime");

    let mut reloaded = false;
    for _ in 0..200 {
        let snapshot = daemon.processor().runtime().current();
        if snapshot.config.plugin_order(100).is_empty() {
            reloaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reloaded, "watcher should install the updated config");

    let outcome = handle
        .submit(event(100, 2, "hello"))
        .await
        .expect("event task");
    assert_eq!(outcome, ProcessOutcome::Ignored);

    daemon.shutdown().await;
    assert_eq!(handle.in_flight(), 0);
}

#[tokio::test]
async fn invalid_reload_keeps_previous_snapshot() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");
    let store = ConfigStore::new(&config_path);
    store
        .save(&config(vec![chat(7, &["every_second_upper"])]))
        .expect("save config");

    let source = SnapshotSource {
        store,
        provider: Arc::new(EchoProvider),
        default_plugins_dir: dir.path().join("plugins"),
    };
    let runtime = Arc::new(fancifier::daemon::SharedRuntime::new(
        source.build().expect("initial snapshot"),
    ));

    std::fs::write(&config_path, "chats = [ { chat_id = 1 }, { chat_id = 1 } ]")
        .expect("write duplicate chats");
    assert!(source.reload_into(&runtime).is_err());
    assert_eq!(
        runtime.current().config.plugin_order(7),
        ["every_second_upper".to_owned()]
    );
}

#[tokio::test]
async fn watcher_is_idle_when_file_is_untouched() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "").expect("write config");

    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut watcher = ConfigWatcher::new(&config_path, Duration::from_millis(10));
    let counter = Arc::clone(&calls);
    watcher.on_change(Arc::new(move || -> anyhow::Result<()> {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }));
    watcher.start();
    tokio::time::sleep(Duration::from_millis(80)).await;
    watcher.stop().await;

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}
