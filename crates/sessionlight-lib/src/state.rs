//! Session registry persistence.
//!
//! The registry is the only durable artifact shared between invocations:
//!
//! ```json
//! {
//!   "sessions": {
//!     "session-abc": { "mode": "working", "timestamp": 1718000000000 }
//!   }
//! }
//! ```
//!
//! A missing or unparsable file reads as an empty registry. Writes go through
//! a temp file in the same directory followed by a rename, so a reader never
//! sees a half-written registry. Callers must hold the session lock around
//! [`SessionStore::write`] and [`SessionStore::upsert_and_sweep`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mode::ModeTag;

/// Sessions not seen for longer than this are evicted.
pub const STALE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub mode: ModeTag,
    /// Last report time, epoch milliseconds.
    #[serde(rename = "timestamp")]
    pub last_seen_ms: u64,
}

impl Session {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen_ms)
    }

    pub fn is_stale(&self, now_ms: u64, stale_after: Duration) -> bool {
        u128::from(self.age_ms(now_ms)) > stale_after.as_millis()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRegistry {
    #[serde(default)]
    pub sessions: BTreeMap<String, Session>,
}

impl SessionRegistry {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn modes(&self) -> impl Iterator<Item = ModeTag> + '_ {
        self.sessions.values().map(|s| s.mode)
    }

    /// Drop every stale session. Returns the evicted ids.
    pub fn sweep(&mut self, now_ms: u64, stale_after: Duration) -> Vec<String> {
        let evicted: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.is_stale(now_ms, stale_after))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &evicted {
            self.sessions.remove(id);
        }
        evicted
    }

    pub fn upsert(&mut self, session_id: &str, mode: ModeTag, now_ms: u64) {
        self.sessions.insert(
            session_id.to_string(),
            Session {
                mode,
                last_seen_ms: now_ms,
            },
        );
    }
}

/// File-backed session registry.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
    stale_after: Duration,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, stale_after: Duration) -> Self {
        SessionStore {
            path: path.into(),
            stale_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Read the persisted registry. Never fails: corruption reads as empty.
    pub fn read(&self) -> SessionRegistry {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return SessionRegistry::default();
            }
            Err(e) => {
                log::warn!("state read failed ({}): {e}", self.path.display());
                return SessionRegistry::default();
            }
        };
        if content.trim().is_empty() {
            return SessionRegistry::default();
        }
        match serde_json::from_str(&content) {
            Ok(registry) => registry,
            Err(e) => {
                log::warn!(
                    "state file unparsable ({}), starting empty: {e}",
                    self.path.display()
                );
                SessionRegistry::default()
            }
        }
    }

    /// Persist the registry atomically (temp file, then rename).
    pub fn write(&self, registry: &SessionRegistry) -> crate::error::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let contents = serde_json::to_string_pretty(registry)
            .map_err(|e| crate::SessionlightError::State(e.to_string()))?;
        let tmp = self.path.with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&tmp, contents)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Read, evict stale sessions, record this session's report, persist.
    ///
    /// The returned registry is what was written, so callers never observe a
    /// stale member. A failed write is logged and the in-memory result is
    /// still returned: the indicator should reflect the report even if the
    /// next invocation will not see it.
    pub fn upsert_and_sweep(&self, session_id: &str, mode: ModeTag, now_ms: u64) -> SessionRegistry {
        let mut registry = self.read();
        for id in registry.sweep(now_ms, self.stale_after) {
            log::info!("cleaned up stale session: {id}");
        }
        registry.upsert(session_id, mode, now_ms);
        if let Err(e) = self.write(&registry) {
            log::warn!("state write failed ({}): {e}", self.path.display());
        }
        registry
    }

    /// Read and sweep; persist only if something was evicted.
    pub fn read_swept(&self, now_ms: u64) -> SessionRegistry {
        let mut registry = self.read();
        let evicted = registry.sweep(now_ms, self.stale_after);
        if !evicted.is_empty() {
            for id in &evicted {
                log::info!("cleaned up stale session: {id}");
            }
            if let Err(e) = self.write(&registry) {
                log::warn!("state write failed ({}): {e}", self.path.display());
            }
        }
        registry
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
