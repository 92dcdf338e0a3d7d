//! Config file polling and callback dispatch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use fancifier::config::ConfigWatcher;

fn bump_mtime(path: &std::path::Path, ahead: Duration) {
    let file = std::fs::File::options()
        .write(true)
        .open(path)
        .expect("open watched file");
    file.set_modified(SystemTime::now() + ahead)
        .expect("set mtime");
}

async fn wait_for(counter: &AtomicUsize, expected: usize) -> bool {
    for _ in 0..200 {
        if counter.load(Ordering::SeqCst) >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn counting_watcher(path: &std::path::Path, counter: &Arc<AtomicUsize>) -> ConfigWatcher {
    let mut watcher = ConfigWatcher::new(path, Duration::from_millis(10));
    let counter = Arc::clone(counter);
    watcher.on_change(Arc::new(move || -> anyhow::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    watcher
}

#[tokio::test]
async fn mtime_increase_fires_each_callback_once() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").expect("write");

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let mut watcher = counting_watcher(&path, &first);
    let counter = Arc::clone(&second);
    watcher.on_change(Arc::new(move || -> anyhow::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    watcher.start();
    assert!(watcher.is_running());

    bump_mtime(&path, Duration::from_secs(5));
    assert!(wait_for(&first, 1).await);
    assert!(wait_for(&second, 1).await);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(first.load(Ordering::SeqCst), 1);

    bump_mtime(&path, Duration::from_secs(10));
    assert!(wait_for(&first, 2).await);

    watcher.stop().await;
    assert!(!watcher.is_running());
}

#[tokio::test]
async fn failing_callback_does_not_stop_the_loop() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "").expect("write");

    let calls = Arc::new(AtomicUsize::new(0));
    let mut watcher = ConfigWatcher::new(&path, Duration::from_millis(10));
    let counter = Arc::clone(&calls);
    watcher.on_change(Arc::new(move || -> anyhow::Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("reload exploded")
    }));
    watcher.start();

    bump_mtime(&path, Duration::from_secs(5));
    assert!(wait_for(&calls, 1).await);
    bump_mtime(&path, Duration::from_secs(10));
    assert!(wait_for(&calls, 2).await);

    watcher.stop().await;
}

#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn install(&self) -> tracing::subscriber::DefaultGuard {
        let buffer = Arc::clone(&self.0);
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || CaptureWriter(Arc::clone(&buffer)))
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer lock")).into_owned()
    }
}

#[tokio::test]
async fn file_created_after_start_is_only_recorded() {
    let logs = LogCapture::default();
    let _guard = logs.install();
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("config.toml");

    let calls = Arc::new(AtomicUsize::new(0));
    let mut watcher = counting_watcher(&path, &calls);
    watcher.start();
    tokio::time::sleep(Duration::from_millis(30)).await;

    std::fs::write(&path, "").expect("write");
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let output = logs.contents();
    assert!(
        output.contains("config file appeared"),
        "creation should be logged:\n{output}"
    );

    bump_mtime(&path, Duration::from_secs(5));
    assert!(wait_for(&calls, 1).await);

    watcher.stop().await;
}

#[tokio::test]
async fn stop_without_start_is_a_no_op() {
    let mut watcher = ConfigWatcher::new("/nonexistent/config.toml", Duration::from_millis(10));
    watcher.stop().await;
    assert!(!watcher.is_running());
}
