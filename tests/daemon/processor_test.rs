//! End-to-end event processing against in-memory transports.

use std::sync::Arc;

use chrono::{Duration, Utc};

use fancifier::daemon::{ProcessOutcome, WouldEdit};
use fancifier::plugins::Plugin;
use fancifier::safeguard::{REASON_SUPERSEDED, REASON_TOO_OLD};
use fancifier::transport::{FormatHint, OutgoingMessage};

use crate::support::{
    chat, config, processor, registry, FailingPlugin, GatedPlugin, LogCapture, RecordedEdit,
    RecordingTransport, SuffixPlugin,
};

fn event(chat_id: i64, message_id: i64, text: &str) -> OutgoingMessage {
    OutgoingMessage::new(chat_id, message_id, text, Utc::now())
}

#[tokio::test]
async fn changed_text_is_committed() {
    let transport = RecordingTransport::new();
    let processor = processor(
        config(vec![chat(100, &["every_second_upper"])]),
        registry(Vec::new()),
        Arc::clone(&transport),
        false,
    );

    let outcome = processor.process(event(100, 7, "привет")).await;

    assert_eq!(
        outcome,
        ProcessOutcome::Edited {
            text: "пРиВеТ".to_owned()
        }
    );
    assert_eq!(
        transport.edits(),
        vec![RecordedEdit {
            chat_id: 100,
            message_id: 7,
            text: "пРиВеТ".to_owned(),
            format: FormatHint::MarkdownV2,
        }]
    );
}

#[tokio::test]
async fn dry_run_flag_returns_would_edit_without_committing() {
    let transport = RecordingTransport::new();
    let processor = processor(
        config(vec![chat(100, &["every_second_upper"])]),
        registry(Vec::new()),
        Arc::clone(&transport),
        true,
    );

    let outcome = processor.process(event(100, 8, "привет")).await;

    assert_eq!(
        outcome,
        ProcessOutcome::DryRun(WouldEdit {
            chat_id: 100,
            message_id: 8,
            before: "привет".to_owned(),
            after: "пРиВеТ".to_owned(),
        })
    );
    assert!(transport.edits().is_empty());
}

#[tokio::test]
async fn default_dry_run_from_config_also_suppresses_edits() {
    let transport = RecordingTransport::new();
    let mut app_config = config(vec![chat(100, &["every_second_upper"])]);
    app_config.default_dry_run = true;
    let processor = processor(app_config, registry(Vec::new()), Arc::clone(&transport), false);

    let outcome = processor.process(event(100, 9, "hello")).await;

    assert!(matches!(outcome, ProcessOutcome::DryRun(_)));
    assert!(transport.edits().is_empty());
}

#[tokio::test]
async fn unknown_plugin_aborts_without_edit() {
    let transport = RecordingTransport::new();
    let processor = processor(
        config(vec![chat(100, &["unknown_plugin"])]),
        registry(Vec::new()),
        Arc::clone(&transport),
        false,
    );

    let outcome = processor.process(event(100, 1, "hello")).await;

    assert_eq!(
        outcome,
        ProcessOutcome::Failed {
            plugin_id: "unknown_plugin".to_owned()
        }
    );
    assert!(transport.edits().is_empty());
}

#[tokio::test]
async fn chain_failure_is_logged_with_plugin_id() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let transport = RecordingTransport::new();
    let processor = processor(
        config(vec![chat(100, &["every_second_upper", "unknown_plugin"])]),
        registry(Vec::new()),
        Arc::clone(&transport),
        false,
    );

    processor.process(event(100, 1, "hello")).await;

    let output = logs.contents();
    let line = output
        .lines()
        .find(|line| line.contains("plugin chain failed"))
        .unwrap_or_else(|| panic!("no chain failure in logs:\n{output}"));
    assert!(line.contains("ERROR"), "{line}");
    assert!(line.contains("plugin_id=unknown_plugin"), "{line}");
    assert!(line.contains("chat_id=100"), "{line}");
}

#[tokio::test]
async fn failing_plugin_keeps_original_even_after_earlier_steps() {
    let transport = RecordingTransport::new();
    let extra: Vec<Arc<dyn Plugin>> = vec![Arc::new(FailingPlugin)];
    let processor = processor(
        config(vec![chat(5, &["every_second_upper", "always_fails"])]),
        registry(extra),
        Arc::clone(&transport),
        false,
    );

    let outcome = processor.process(event(5, 1, "hello")).await;

    assert_eq!(
        outcome,
        ProcessOutcome::Failed {
            plugin_id: "always_fails".to_owned()
        }
    );
    assert!(transport.edits().is_empty());
}

#[tokio::test]
async fn no_op_chain_does_not_edit() {
    let transport = RecordingTransport::new();
    let processor = processor(
        config(vec![chat(100, &["every_second_upper"])]),
        registry(Vec::new()),
        Arc::clone(&transport),
        false,
    );

    let outcome = processor.process(event(100, 3, "hElLo 123")).await;

    assert_eq!(outcome, ProcessOutcome::Unchanged);
    assert!(transport.edits().is_empty());
}

#[tokio::test]
async fn unconfigured_chat_and_incomplete_events_are_ignored() {
    let transport = RecordingTransport::new();
    let processor = processor(
        config(vec![chat(100, &["every_second_upper"]), chat(200, &[])]),
        registry(Vec::new()),
        Arc::clone(&transport),
        false,
    );

    assert_eq!(
        processor.process(event(999, 1, "hello")).await,
        ProcessOutcome::Ignored
    );
    assert_eq!(
        processor.process(event(200, 1, "hello")).await,
        ProcessOutcome::Ignored
    );
    assert_eq!(
        processor.process(event(100, 1, "")).await,
        ProcessOutcome::Ignored
    );

    let mut missing_id = event(100, 2, "hello");
    missing_id.message_id = None;
    assert_eq!(processor.process(missing_id).await, ProcessOutcome::Ignored);

    assert!(transport.edits().is_empty());
    assert_eq!(processor.chat_states().last_seen(999), None);
    assert_eq!(processor.chat_states().last_seen(100), None);
}

#[tokio::test]
async fn old_message_is_rejected_by_safeguard() {
    let transport = RecordingTransport::new();
    let processor = processor(
        config(vec![chat(100, &["every_second_upper"])]),
        registry(Vec::new()),
        Arc::clone(&transport),
        false,
    );

    let stale = OutgoingMessage::new(100, 4, "hello", Utc::now() - Duration::seconds(60));
    let outcome = processor.process(stale).await;

    assert_eq!(
        outcome,
        ProcessOutcome::Rejected {
            reason: REASON_TOO_OLD.to_owned()
        }
    );
    assert!(transport.edits().is_empty());
}

#[tokio::test]
async fn transport_failure_is_reported_not_retried() {
    let transport = RecordingTransport::failing();
    let processor = processor(
        config(vec![chat(100, &["every_second_upper"])]),
        registry(Vec::new()),
        Arc::clone(&transport),
        false,
    );

    let outcome = processor.process(event(100, 1, "hello")).await;

    assert!(matches!(outcome, ProcessOutcome::EditFailed { .. }));
}

#[tokio::test]
async fn format_hint_follows_parse_mode() {
    let transport = RecordingTransport::new();
    let extra: Vec<Arc<dyn Plugin>> = vec![Arc::new(SuffixPlugin("bang", "!"))];
    let mut app_config = config(vec![chat(1, &["bang", "bang"])]);
    app_config.parse_mode = "plain".to_owned();
    let processor = processor(app_config, registry(extra), Arc::clone(&transport), false);

    let outcome = processor.process(event(1, 1, "hi")).await;

    assert_eq!(
        outcome,
        ProcessOutcome::Edited {
            text: "hi!!".to_owned()
        }
    );
    assert_eq!(transport.edits()[0].format, FormatHint::Plain);
}

#[tokio::test]
async fn newer_message_supersedes_in_flight_edit() {
    let transport = RecordingTransport::new();
    let gated = GatedPlugin::new("gated", "~");
    let extra: Vec<Arc<dyn Plugin>> = vec![gated.clone()];
    let processor = processor(
        config(vec![chat(100, &["gated"])]),
        registry(extra),
        Arc::clone(&transport),
        false,
    );

    let first = tokio::spawn({
        let processor = Arc::clone(&processor);
        async move { processor.process(event(100, 1, "one")).await }
    });
    gated.entered.notified().await;

    // The second event records itself as last seen, then queues on the lock.
    let second = tokio::spawn({
        let processor = Arc::clone(&processor);
        async move { processor.process(event(100, 2, "two")).await }
    });
    while processor.chat_states().last_seen(100) != Some(2) {
        tokio::task::yield_now().await;
    }

    gated.open();
    let first = first.await.expect("first task");
    let second = second.await.expect("second task");

    assert_eq!(first, ProcessOutcome::Superseded);
    assert_eq!(
        second,
        ProcessOutcome::Edited {
            text: "two~".to_owned()
        }
    );
    let edits = transport.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].message_id, 2);
}

#[tokio::test]
async fn queued_message_superseded_before_its_turn_is_rejected() {
    let transport = RecordingTransport::new();
    let gated = GatedPlugin::new("gated", "~");
    let extra: Vec<Arc<dyn Plugin>> = vec![gated.clone()];
    let processor = processor(
        config(vec![chat(100, &["gated"])]),
        registry(extra),
        Arc::clone(&transport),
        false,
    );

    let spawn = |message_id: i64, text: &'static str| {
        let processor = Arc::clone(&processor);
        tokio::spawn(async move { processor.process(event(100, message_id, text)).await })
    };

    let first = spawn(1, "one");
    gated.entered.notified().await;
    let second = spawn(2, "two");
    while processor.chat_states().last_seen(100) != Some(2) {
        tokio::task::yield_now().await;
    }
    let third = spawn(3, "three");
    while processor.chat_states().last_seen(100) != Some(3) {
        tokio::task::yield_now().await;
    }

    gated.open();
    assert_eq!(first.await.expect("first task"), ProcessOutcome::Superseded);
    assert_eq!(
        second.await.expect("second task"),
        ProcessOutcome::Rejected {
            reason: REASON_SUPERSEDED.to_owned()
        }
    );
    assert_eq!(
        third.await.expect("third task"),
        ProcessOutcome::Edited {
            text: "three~".to_owned()
        }
    );
    let edits = transport.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].message_id, 3);
}

#[tokio::test]
async fn different_chats_do_not_block_each_other() {
    let transport = RecordingTransport::new();
    let gated = GatedPlugin::new("gated", "~");
    let extra: Vec<Arc<dyn Plugin>> = vec![gated.clone()];
    let processor = processor(
        config(vec![chat(1, &["gated"]), chat(2, &["every_second_upper"])]),
        registry(extra),
        Arc::clone(&transport),
        false,
    );

    let blocked = tokio::spawn({
        let processor = Arc::clone(&processor);
        async move { processor.process(event(1, 1, "wait")).await }
    });
    gated.entered.notified().await;

    let other = processor.process(event(2, 1, "hello")).await;
    assert_eq!(
        other,
        ProcessOutcome::Edited {
            text: "hElLo".to_owned()
        }
    );

    gated.open();
    assert_eq!(
        blocked.await.expect("blocked task"),
        ProcessOutcome::Edited {
            text: "wait~".to_owned()
        }
    );
}
