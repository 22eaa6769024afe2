use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One exclusive critical section per entity id.
///
/// Operations on different ids never contend; operations on the same id are
/// totally ordered. Acquisition is bounded by `timeout` and reports `Busy`
/// instead of waiting forever.
pub struct KeyedLocks<T> {
    entity: &'static str,
    slots: RwLock<HashMap<Uuid, Arc<Mutex<T>>>>,
    timeout: Duration,
}

impl<T: Send + 'static> KeyedLocks<T> {
    pub fn new(entity: &'static str, timeout: Duration) -> Self {
        Self {
            entity,
            slots: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Register state for `key`. Returns false if the key already exists.
    pub fn insert(&self, key: Uuid, value: T) -> bool {
        let mut slots = self.slots.write();
        if slots.contains_key(&key) {
            return false;
        }
        slots.insert(key, Arc::new(Mutex::new(value)));
        true
    }

    pub fn keys(&self) -> Vec<Uuid> {
        self.slots.read().keys().copied().collect()
    }

    /// Acquire the critical section for `key`.
    pub async fn lock(&self, key: &Uuid) -> Result<OwnedMutexGuard<T>, LockError> {
        let slot = self
            .slots
            .read()
            .get(key)
            .cloned()
            .ok_or(LockError::NotFound {
                entity: self.entity,
                key: *key,
            })?;

        match tokio::time::timeout(self.timeout, slot.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                tracing::warn!(entity = self.entity, key = %key, "lock acquisition timed out");
                Err(LockError::Busy {
                    entity: self.entity,
                    key: *key,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: Uuid },

    #[error("{entity} {key} is busy, retry later")]
    Busy { entity: &'static str, key: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_times_out_as_busy() {
        let locks = KeyedLocks::new("session", Duration::from_millis(20));
        let key = Uuid::new_v4();
        assert!(locks.insert(key, 0u32));
        assert!(!locks.insert(key, 1u32));

        let held = locks.lock(&key).await.unwrap();
        let err = locks.lock(&key).await.unwrap_err();
        assert_eq!(err, LockError::Busy { entity: "session", key });

        drop(held);
        assert!(locks.lock(&key).await.is_ok());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let locks = KeyedLocks::new("membership", Duration::from_millis(20));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        locks.insert(a, ());
        locks.insert(b, ());

        let _held_a = locks.lock(&a).await.unwrap();
        assert!(locks.lock(&b).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let locks: KeyedLocks<()> = KeyedLocks::new("session", Duration::from_millis(20));
        let key = Uuid::new_v4();
        assert!(matches!(
            locks.lock(&key).await,
            Err(LockError::NotFound { .. })
        ));
    }
}
