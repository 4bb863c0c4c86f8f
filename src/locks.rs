// Keyed lock registry
//
// One async mutex per key, created on first use and dropped again once the
// last holder or waiter is gone.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, JayeError};

/// Registry of per-key async locks
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Exclusive hold on one key. Releasing it removes the key's lock from the
/// registry when nobody else is waiting for it.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Release first so the guard's own Arc no longer counts as a user.
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. A cancelled token wins over a lock
    /// that becomes free at the same moment, so a cancelled request never
    /// enters the critical section.
    pub async fn acquire(&self, key: &str, cancel: &CancellationToken) -> Result<KeyGuard> {
        if cancel.is_cancelled() {
            return Err(JayeError::Cancelled);
        }

        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let mut held = KeyGuard {
            key: key.to_string(),
            guard: None,
            locks: Arc::clone(&self.locks),
        };

        debug!("Waiting for lock on {}", key);
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // Our clone must be gone before `held` drops, or the idle entry stays.
                drop(lock);
                return Err(JayeError::Cancelled);
            }
            guard = Arc::clone(&lock).lock_owned() => guard,
        };

        held.guard = Some(guard);
        Ok(held)
    }

    /// Number of keys currently held or waited on
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
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("abc", &CancellationToken::new()).await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let cancel = CancellationToken::new();
        let a = locks.acquire("a", &cancel).await.unwrap();
        let b = tokio::time::timeout(Duration::from_secs(1), locks.acquire("b", &cancel))
            .await
            .expect("unrelated key blocked")
            .unwrap();
        assert_eq!(a.key(), "a");
        assert_eq!(b.key(), "b");
        assert_eq!(locks.len(), 2);
        drop(a);
        drop(b);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_waiter_never_enters() {
        let locks = Arc::new(KeyedLocks::new());
        let held = locks.acquire("abc", &CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        let waiter = {
            let locks = Arc::clone(&locks);
            let cancel = cancel.clone();
            tokio::spawn(async move { locks.acquire("abc", &cancel).await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(JayeError::Cancelled)));

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_token_is_rejected() {
        let locks = KeyedLocks::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(locks.acquire("abc", &cancel).await, Err(JayeError::Cancelled)));
        assert!(locks.is_empty());
    }
}
