//! Polling watch loop.
//!
//! A dedicated scanner thread periodically lists files modified since
//! the last scan, re-checks each through the engine, and forwards the
//! results over a channel to a dispatcher that invokes the caller's
//! callback. The stop flag is polled between iterations; in-flight
//! checks run to completion.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use crossbeam_channel::unbounded;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{CheckResult, FastCheckEngine};

/// Source extension the watcher reacts to.
const SOURCE_EXTENSION: &str = "vsp";

#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub result: CheckResult,
}

/// Handle to a running watch loop. Stopping joins both workers.
pub struct FileWatcher {
    stop: Arc<AtomicBool>,
    scanner: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.scanner.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start watching `roots`, invoking `callback` for every modified file
/// that gets re-checked.
pub fn watch<F>(engine: Arc<FastCheckEngine>, roots: Vec<PathBuf>, callback: F) -> FileWatcher
where
    F: Fn(&Path, &CheckResult) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let interval = engine.config().watch_interval;
    let (sender, receiver) = unbounded::<WatchEvent>();

    let scanner_stop = stop.clone();
    let scanner = std::thread::Builder::new()
        .name("fastcheck-watch".to_string())
        .spawn(move || {
            let mut last_scan = SystemTime::now();
            while !scanner_stop.load(Ordering::Relaxed) {
                let scan_started = SystemTime::now();
                for path in modified_since(&roots, last_scan) {
                    if scanner_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    match engine.check_file(&path) {
                        Ok(result) => {
                            debug!(path = %path.display(), "watch re-check complete");
                            let event = WatchEvent {
                                path: path.clone(),
                                result,
                            };
                            if sender.send(event).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!(path = %path.display(), %err, "watch re-check failed");
                        }
                    }
                }
                last_scan = scan_started;
                sleep_with_stop(&scanner_stop, interval);
            }
        })
        .expect("failed to spawn watch scanner thread");

    let dispatcher = std::thread::Builder::new()
        .name("fastcheck-dispatch".to_string())
        .spawn(move || {
            // Drains until the scanner drops its sender.
            for event in receiver.iter() {
                callback(&event.path, &event.result);
            }
        })
        .expect("failed to spawn watch dispatcher thread");

    FileWatcher {
        stop,
        scanner: Some(scanner),
        dispatcher: Some(dispatcher),
    }
}

/// Sleep in small slices so a stop request is honored promptly.
fn sleep_with_stop(stop: &AtomicBool, total: Duration) {
    let slice = Duration::from_millis(25);
    let mut remaining = total;
    while !stop.load(Ordering::Relaxed) && !remaining.is_zero() {
        let step = slice.min(remaining);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}

/// Source files under `roots` whose mtime is newer than `since`.
fn modified_since(roots: &[PathBuf], since: SystemTime) -> Vec<PathBuf> {
    let mut modified = Vec::new();
    for root in roots {
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if let Ok(mtime) = metadata.modified() {
                if mtime > since {
                    modified.push(path.to_path_buf());
                }
            }
        }
    }
    modified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fastcheck::FastCheckConfig;
    use parking_lot::Mutex;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn wait_until(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if predicate() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        predicate()
    }

    #[test]
    fn watch_reports_modified_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("w.vsp");
        fs::write(&path, "let x = 1;").unwrap();

        let engine = Arc::new(
            FastCheckEngine::new(FastCheckConfig {
                worker_threads: 2,
                watch_interval: Duration::from_millis(50),
                ..Default::default()
            })
            .unwrap(),
        );

        let seen: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in_callback = seen.clone();
        let watcher = watch(
            engine,
            vec![dir.path().to_path_buf()],
            move |path, _result| {
                seen_in_callback.lock().push(path.to_path_buf());
            },
        );

        // Give the first scan a moment, then touch the file.
        std::thread::sleep(Duration::from_millis(120));
        fs::write(&path, "let x = 2;").unwrap();

        let observed = wait_until(Duration::from_secs(5), || {
            seen.lock().iter().any(|p| p == &path)
        });
        watcher.stop();
        assert!(observed, "watch loop never reported the modified file");
    }

    #[test]
    fn stop_terminates_the_loop() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(
            FastCheckEngine::new(FastCheckConfig {
                worker_threads: 1,
                watch_interval: Duration::from_millis(50),
                ..Default::default()
            })
            .unwrap(),
        );

        let watcher = watch(engine, vec![dir.path().to_path_buf()], |_, _| {});
        assert!(watcher.is_running());
        watcher.stop();
    }
}
