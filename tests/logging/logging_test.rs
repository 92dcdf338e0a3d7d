//! Tests for `src/logging.rs`.

use fancifier::logging::{LoggingGuard, LOG_FILE_PREFIX};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_production_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // Only one global subscriber per process; the directory is created
    // before installation is attempted.
    if let Ok(guard) = fancifier::logging::init_production(&logs_dir) {
        assert_eq!(guard.log_dir(), logs_dir.as_path());
        tracing::info!("logging smoke test");
    }
    assert!(logs_dir.exists(), "logs directory should be created");
}

#[test]
fn init_cli_tolerates_existing_subscriber() {
    fancifier::logging::init_cli();
    fancifier::logging::init_cli();
    assert_eq!(LOG_FILE_PREFIX, "fancifier.log");
}
