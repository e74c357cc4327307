//! Cross-process mutual exclusion around the session registry.
//!
//! [`FileLock`] is a token file holding the acquisition time in epoch
//! milliseconds. It is created with `O_EXCL`, so exactly one contender wins.
//! A token older than the stale threshold is unlinked and acquisition retried
//! at once; a token whose content does not parse ages by its modification
//! time instead. Not reentrant.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::state::now_millis;

pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Retries without sleeping after a token vanished or was reclaimed, per
/// `acquire` call.
const MAX_IMMEDIATE_RETRIES: u32 = 8;

pub trait SessionLock {
    /// Try to take the lock, waiting at most `timeout`.
    fn acquire(&self, timeout: Duration) -> bool;

    /// Give the lock up. Releasing a lock that is not held is a no-op.
    fn release(&self);
}

/// Holds a [`SessionLock`] until dropped.
pub struct LockGuard<'a> {
    lock: &'a dyn SessionLock,
}

impl<'a> LockGuard<'a> {
    /// `None` if the lock could not be taken within `timeout`.
    pub fn acquire(lock: &'a dyn SessionLock, timeout: Duration) -> Option<Self> {
        lock.acquire(timeout).then_some(LockGuard { lock })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

// ── File lock ──

#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    stale_after: Duration,
    poll_interval: Duration,
    held: AtomicBool,
}

/// What stands in the way of creating the token.
enum Holder {
    Gone,
    Fresh,
    Stale(Duration),
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        FileLock {
            path: path.into(),
            stale_after,
            poll_interval: POLL_INTERVAL,
            held: AtomicBool::new(false),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the token exclusively. `Ok(false)` if someone else holds it.
    fn try_create(&self) -> io::Result<bool> {
        let open = || {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
        };
        let file = match open() {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(dir) = self.path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                open()
            }
            other => other,
        };
        match file {
            Ok(mut f) => {
                write!(f, "{}", now_millis())?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Age of the current token, by content or, failing that, by mtime.
    /// `None` only when the token is gone; a token that cannot be inspected
    /// counts as fresh.
    fn token_age(&self) -> Option<Duration> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => Some(c),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::debug!("cannot read lock token: {e}");
                None
            }
        };
        if let Some(acquired_ms) = content.and_then(|c| c.trim().parse::<u64>().ok()) {
            return Some(Duration::from_millis(
                now_millis().saturating_sub(acquired_ms),
            ));
        }
        match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => Some(
                SystemTime::now()
                    .duration_since(modified)
                    .unwrap_or(Duration::ZERO),
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(_) => Some(Duration::ZERO),
        }
    }

    fn holder(&self) -> Holder {
        match self.token_age() {
            None => Holder::Gone,
            Some(age) if age > self.stale_after => Holder::Stale(age),
            Some(_) => Holder::Fresh,
        }
    }
}

impl SessionLock for FileLock {
    fn acquire(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut immediate = 0;
        loop {
            let retry_now = match self.try_create() {
                Ok(true) => {
                    self.held.store(true, Ordering::SeqCst);
                    return true;
                }
                Ok(false) => match self.holder() {
                    Holder::Gone => true,
                    Holder::Stale(age) => {
                        log::info!("reclaiming stale lock ({}ms old)", age.as_millis());
                        match std::fs::remove_file(&self.path) {
                            Ok(()) => true,
                            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
                            Err(e) => {
                                log::warn!("cannot remove stale lock: {e}");
                                false
                            }
                        }
                    }
                    Holder::Fresh => false,
                },
                Err(e) => {
                    log::warn!("lock {} unavailable: {e}", self.path.display());
                    return false;
                }
            };
            if retry_now && immediate < MAX_IMMEDIATE_RETRIES {
                immediate += 1;
                continue;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn release(&self) {
        if !self.held.swap(false, Ordering::SeqCst) {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("lock release failed: {e}"),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}

// ── In-process lock ──

/// Lock shared between clones in one process. Stands in for [`FileLock`]
/// when contenders are threads.
#[derive(Debug, Clone, Default)]
pub struct InProcessLock {
    taken: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl InProcessLock {
    pub fn new() -> Self {
        InProcessLock {
            taken: Arc::new(AtomicBool::new(false)),
            poll_interval: Duration::from_millis(1),
        }
    }

    pub fn is_taken(&self) -> bool {
        self.taken.load(Ordering::SeqCst)
    }
}

impl SessionLock for InProcessLock {
    fn acquire(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self
                .taken
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(self.poll_interval.max(Duration::from_millis(1)));
        }
    }

    fn release(&self) {
        self.taken.store(false, Ordering::SeqCst);
    }
}
