//! Polling change notifier for source directories.
//!
//! A background thread fingerprints every watched directory each poll
//! interval and reports the ones whose listing changed. Every directory is
//! reported once right after start so consumers perform an initial scan.

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// Longest the watcher thread sleeps before rechecking its running flag.
const STOP_GRANULARITY: Duration = Duration::from_millis(50);

/// Notification from the watcher thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The listing of a directory changed since the last poll.
    Changed(PathBuf),
    /// A directory could not be read. Reported once until it recovers.
    Error { dir: PathBuf, message: String },
}

/// Errors controlling the watcher.
#[derive(Debug)]
pub enum WatchError {
    AlreadyRunning,
    Spawn(String),
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchError::AlreadyRunning => write!(f, "Watcher is already running"),
            WatchError::Spawn(e) => write!(f, "Failed to start watcher thread: {e}"),
        }
    }
}

impl std::error::Error for WatchError {}

/// Cheap summary of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    entries: usize,
    newest: Option<SystemTime>,
    modified: Option<SystemTime>,
}

fn fingerprint(dir: &Path) -> std::io::Result<Fingerprint> {
    let modified = std::fs::metadata(dir)?.modified().ok();
    let mut entries = 0;
    let mut newest = None;
    for item in std::fs::read_dir(dir)? {
        let Ok(item) = item else { continue };
        entries += 1;
        if let Ok(mtime) = item.metadata().and_then(|m| m.modified()) {
            newest = newest.max(Some(mtime));
        }
    }
    Ok(Fingerprint {
        entries,
        newest,
        modified,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DirState {
    Unseen,
    Seen(Fingerprint),
    Failed,
}

/// Watches a fixed set of directories from a background thread.
pub struct DirectoryWatcher {
    dirs: Vec<PathBuf>,
    poll_interval: Duration,
    sender: Sender<WatchEvent>,
    receiver: Receiver<WatchEvent>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DirectoryWatcher {
    pub fn new(dirs: Vec<PathBuf>, poll_interval: Duration) -> Self {
        let (sender, receiver) = bounded(1_024);
        Self {
            dirs,
            poll_interval,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Start polling.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(WatchError::AlreadyRunning);
        }
        // Reap a thread left over from a previous run.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.running.store(true, Ordering::SeqCst);

        let dirs = self.dirs.clone();
        let interval = self.poll_interval;
        let sender = self.sender.clone();
        let running = Arc::clone(&self.running);

        let handle = std::thread::Builder::new()
            .name("binscope-watcher".to_string())
            .spawn(move || poll_loop(dirs, interval, sender, running))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                WatchError::Spawn(e.to_string())
            })?;
        self.handle = Some(handle);

        info!(dirs = self.dirs.len(), "Directory watcher started");
        Ok(())
    }

    /// Stop polling and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("Directory watcher stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for watch events.
    pub fn receiver(&self) -> &Receiver<WatchEvent> {
        &self.receiver
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<WatchEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for DirectoryWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    dirs: Vec<PathBuf>,
    interval: Duration,
    sender: Sender<WatchEvent>,
    running: Arc<AtomicBool>,
) {
    let mut states = vec![DirState::Unseen; dirs.len()];

    while running.load(Ordering::SeqCst) {
        for (dir, state) in dirs.iter().zip(states.iter_mut()) {
            let (next, event) = match fingerprint(dir) {
                Ok(print) if *state == DirState::Seen(print.clone()) => continue,
                Ok(print) => (DirState::Seen(print), WatchEvent::Changed(dir.clone())),
                Err(_) if *state == DirState::Failed => continue,
                Err(e) => (
                    DirState::Failed,
                    WatchEvent::Error {
                        dir: dir.clone(),
                        message: e.to_string(),
                    },
                ),
            };

            match sender.send_timeout(event, interval.max(STOP_GRANULARITY)) {
                Ok(()) => *state = next,
                // Keep the old state so the change is reported on the next poll.
                Err(SendTimeoutError::Timeout(_)) => {
                    debug!(dir = %dir.display(), "Watch queue full, deferring event");
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }

        let mut slept = Duration::ZERO;
        while slept < interval && running.load(Ordering::SeqCst) {
            let step = STOP_GRANULARITY.min(interval - slept);
            std::thread::sleep(step);
            slept += step;
        }
    }
}
