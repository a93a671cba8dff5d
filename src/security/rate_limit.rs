//! Fixed-window rate limiting.
//!
//! Each client gets one [`RateWindow`]: the second it started and how many
//! requests landed in it. A request more than `window_secs` after the start
//! opens a fresh window; otherwise the count goes up. Windows live in a
//! [`WindowStore`] so they survive across requests (and, with [`FileStore`],
//! across processes sharing a cache directory).

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::Error;

use super::unix_now;

pub const DEFAULT_LIMIT: u64 = 100;
pub const DEFAULT_WINDOW_SECS: u64 = 60;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    pub count: u64,
    pub start: u64,
}

/// Persistence for rate windows, keyed by an opaque client key.
pub trait WindowStore: Send + Sync + 'static {
    fn load(&self, key: &str) -> io::Result<Option<RateWindow>>;
    fn save(&self, key: &str, window: &RateWindow) -> io::Result<()>;
}

/// One small JSON file per client under a cache directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Creates `dir` (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("rate_{key}.json"))
    }
}

impl WindowStore for FileStore {
    fn load(&self, key: &str) -> io::Result<Option<RateWindow>> {
        let path = self.path(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        match serde_json::from_slice(&raw) {
            Ok(window) => Ok(Some(window)),
            Err(e) => {
                warn!(path = %path.display(), "discarding unreadable rate window: {e}");
                Ok(None)
            }
        }
    }

    fn save(&self, key: &str, window: &RateWindow) -> io::Result<()> {
        fs::write(self.path(key), serde_json::to_vec(window)?)
    }
}

/// In-process store, for single-instance deployments and tests.
#[derive(Default)]
pub struct MemoryStore {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WindowStore for MemoryStore {
    fn load(&self, key: &str) -> io::Result<Option<RateWindow>> {
        Ok(self.windows.lock().get(key).copied())
    }

    fn save(&self, key: &str, window: &RateWindow) -> io::Result<()> {
        self.windows.lock().insert(key.to_owned(), *window);
        Ok(())
    }
}

/// Fixed-window limiter over any [`WindowStore`].
///
/// The load-increment-save sequence runs under one lock, so concurrent
/// requests from the same client cannot both read the same count.
pub struct RateLimiter {
    store: Box<dyn WindowStore>,
    limit: u64,
    window_secs: u64,
    lock: Mutex<()>,
}

impl RateLimiter {
    pub fn new(store: impl WindowStore, limit: u64, window_secs: u64) -> Self {
        Self { store: Box::new(store), limit, window_secs, lock: Mutex::new(()) }
    }

    /// 100 requests per 60 seconds.
    pub fn with_defaults(store: impl WindowStore) -> Self {
        Self::new(store, DEFAULT_LIMIT, DEFAULT_WINDOW_SECS)
    }

    /// Counts one request from `client_id`.
    pub fn check(&self, client_id: &str) -> Result<(), Error> {
        self.check_at(client_id, unix_now())
    }

    /// [`check`](Self::check) against an explicit clock.
    ///
    /// The window is saved even when this request trips the limit. Store
    /// failures are logged and the request is let through.
    pub fn check_at(&self, client_id: &str, now: u64) -> Result<(), Error> {
        let key = client_key(client_id);
        let _guard = self.lock.lock();

        let current = self.store.load(&key).unwrap_or_else(|e| {
            warn!("rate window load failed: {e}");
            None
        });

        let window = match current {
            Some(w) if now.saturating_sub(w.start) <= self.window_secs => {
                RateWindow { count: w.count + 1, ..w }
            }
            _ => RateWindow { count: 1, start: now },
        };

        if let Err(e) = self.store.save(&key, &window) {
            warn!("rate window save failed: {e}");
        }

        if window.count > self.limit {
            let elapsed = now.saturating_sub(window.start);
            return Err(Error::RateLimited { retry_after: self.window_secs.saturating_sub(elapsed) });
        }
        Ok(())
    }
}

/// Hex SHA-256 of the client id, safe to use as a file name.
fn client_key(client_id: &str) -> String {
    hex::encode(Sha256::digest(client_id.as_bytes()))
}
