//! Single-writer discipline per session

use super::key::SessionKey;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockTable = DashMap<SessionKey, Arc<Mutex<()>>>;

/// Table of per-session async mutexes.
///
/// A workflow run holds its session's guard from input materialization to
/// finalization, so two runs on the same key never interleave cursor or
/// artifact updates. Different keys never contend. An entry lives only
/// while some task holds or waits on it.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    locks: Arc<LockTable>,
}

/// Exclusive access to one session, released on drop.
#[derive(Debug)]
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: SessionKey,
    locks: Arc<LockTable>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Release first so the table's Arc is the only one left when idle.
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &SessionKey) -> SessionGuard {
        let lock = self.locks.entry(key.clone()).or_default().clone();
        SessionGuard {
            guard: Some(lock.lock_owned().await),
            key: key.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Number of sessions currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = SessionLocks::new();
        let key = SessionKey::parse("s1").unwrap();

        let guard = locks.acquire(&key).await;
        let contender = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = SessionLocks::new();
        let _a = locks.acquire(&SessionKey::parse("a").unwrap()).await;
        let _b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&SessionKey::parse("b").unwrap()),
        )
        .await
        .expect("independent key should lock immediately");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn idle_sessions_leave_the_table() {
        let locks = SessionLocks::new();
        for i in 0..5 {
            let _g = locks.acquire(&SessionKey::parse(format!("k{i}")).unwrap()).await;
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_keeps_the_entry_alive() {
        let locks = SessionLocks::new();
        let key = SessionKey::parse("busy").unwrap();

        let guard = locks.acquire(&key).await;
        let waiter = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
