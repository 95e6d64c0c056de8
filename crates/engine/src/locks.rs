//! Single-flight advisory locks keyed by resource.
//!
//! Destructive operations against the same key (`volume:C`, `recycle-bin`)
//! must not overlap. A second caller is rejected immediately rather than
//! queued.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{key} is already undergoing an operation")]
pub struct Busy {
    pub key: String,
}

#[derive(Debug, Default, Clone)]
pub struct ResourceLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `key`, or fail if it is held.
    pub fn try_acquire(&self, key: impl Into<String>) -> Result<LockGuard, Busy> {
        let key = key.into();
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.clone()) {
            return Err(Busy { key });
        }
        tracing::debug!(%key, "resource lock acquired");
        Ok(LockGuard {
            key,
            held: Arc::clone(&self.held),
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct LockGuard {
    key: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.key);
        tracing::debug!(key = %self.key, "resource lock released");
    }
}

pub fn volume_key(letter: char) -> String {
    format!("volume:{}", letter.to_ascii_uppercase())
}

pub const RECYCLE_BIN_KEY: &str = "recycle-bin";
