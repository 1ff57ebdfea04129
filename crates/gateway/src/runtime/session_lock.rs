//! Per-session concurrency control.
//!
//! Exactly one streaming turn may run per session. A second message
//! arriving while a turn is in flight fails fast with `session_busy`;
//! callers retry once their stream finishes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Manages per-session run locks.
///
/// Each session id maps to a `Semaphore(1)`. Holding the permit grants
/// exclusive access for one turn; it auto-releases on drop.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire the run lock for a session without waiting.
    pub fn try_acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        sem.try_acquire_owned().map_err(|_| SessionBusy)
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop semaphores for sessions with no turn in flight.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// A turn is already in progress on this session.
#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session is busy: a turn is already in progress")
    }
}

impl std::error::Error for SessionBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_access() {
        let map = SessionLockMap::new();

        let permit1 = map.try_acquire("s1").unwrap();
        drop(permit1);

        let permit2 = map.try_acquire("s1").unwrap();
        drop(permit2);
    }

    #[test]
    fn concurrent_same_session_fails_fast() {
        let map = SessionLockMap::new();
        let _permit = map.try_acquire("s1").unwrap();
        assert!(map.try_acquire("s1").is_err());
    }

    #[test]
    fn different_sessions_run_concurrently() {
        let map = SessionLockMap::new();
        let _p1 = map.try_acquire("s1").unwrap();
        let _p2 = map.try_acquire("s2").unwrap();
        assert_eq!(map.session_count(), 2);
    }

    #[test]
    fn prune_keeps_held_locks() {
        let map = SessionLockMap::new();
        let _held = map.try_acquire("busy").unwrap();
        let released = map.try_acquire("idle").unwrap();
        drop(released);

        map.prune_idle();
        assert_eq!(map.session_count(), 1);
        assert!(map.try_acquire("busy").is_err());
    }
}
