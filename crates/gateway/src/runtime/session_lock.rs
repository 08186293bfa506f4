//! Per-session concurrency control.
//!
//! Only one turn runs per session at a time. A second turn for the same
//! session waits until the first one releases its permit; turns for
//! different sessions never contend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Each session id maps to a `Semaphore(1)`.
#[derive(Default)]
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn semaphore(&self, session_id: &str) -> Arc<Semaphore> {
        let mut locks = self.locks.lock();
        match locks.get(session_id) {
            Some(sem) => sem.clone(),
            None => {
                let sem = Arc::new(Semaphore::new(1));
                locks.insert(session_id.to_owned(), sem.clone());
                sem
            }
        }
    }

    /// Acquire the run lock for a session, waiting for any running turn.
    /// The permit releases on drop.
    pub async fn acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        self.semaphore(session_id)
            .acquire_owned()
            .await
            .map_err(|_| SessionBusy)
    }

    /// Take the lock only if no turn is running.
    pub fn try_acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        self.semaphore(session_id)
            .try_acquire_owned()
            .map_err(|_| SessionBusy)
    }

    /// Number of sessions that have ever been locked and not pruned.
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Forget locks nobody holds or waits on. Permits and waiters keep a
    /// clone of the semaphore, so a lone reference means the session is idle.
    pub fn prune_idle(&self) {
        self.locks.lock().retain(|_, sem| Arc::strong_count(sem) > 1);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("session is busy: a turn is already in progress")]
pub struct SessionBusy;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn permit_release_lets_next_turn_in() {
        let locks = SessionLockMap::new();
        let first = locks.acquire("trip-1").await.unwrap();
        assert!(locks.try_acquire("trip-1").is_err());
        drop(first);
        assert!(locks.try_acquire("trip-1").is_ok());
    }

    #[tokio::test]
    async fn other_sessions_are_not_blocked() {
        let locks = SessionLockMap::new();
        let _paris = locks.acquire("paris").await.unwrap();
        let _rome = locks.acquire("rome").await.unwrap();
        assert_eq!(locks.session_count(), 2);
    }

    #[tokio::test]
    async fn queued_turn_runs_after_the_first_finishes() {
        let locks = Arc::new(SessionLockMap::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = locks.acquire("trip-1").await.unwrap();
        let queued = {
            let locks = locks.clone();
            let order = order.clone();
            tokio::spawn(async move {
                let _permit = locks.acquire("trip-1").await.unwrap();
                order.lock().push("second");
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!queued.is_finished());
        order.lock().push("first");
        drop(first);

        queued.await.unwrap();
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn prune_forgets_only_idle_sessions() {
        let locks = SessionLockMap::new();
        let _held = locks.acquire("busy").await.unwrap();
        drop(locks.acquire("idle").await.unwrap());

        locks.prune_idle();
        assert_eq!(locks.session_count(), 1);
        assert!(locks.try_acquire("busy").is_err());
    }

    #[tokio::test]
    async fn prune_keeps_a_lock_someone_is_waiting_on() {
        let locks = Arc::new(SessionLockMap::new());
        let held = locks.acquire("trip-1").await.unwrap();
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("trip-1").await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        locks.prune_idle();
        waiter.await.unwrap().unwrap();

        locks.prune_idle();
        assert_eq!(locks.session_count(), 0);
    }
}
