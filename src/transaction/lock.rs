use std::sync::Mutex;

use ahash::{AHashMap, AHashSet};

use super::error::{LockError, LockResult};

/// Identifies one transaction; larger ids are younger
pub type TransactionId = u64;

/// Lock strength on one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Default)]
struct LockEntry {
    holders: AHashSet<TransactionId>,
    exclusive: bool,
}

/// Record-granularity shared/exclusive lock table, keyed by primary-key
/// value.
///
/// Acquisition is non-blocking: it reports success or the conflicting holder
/// immediately and never suspends the calling thread. Suspension, backoff,
/// and deadlock handling are the worker's concern.
pub struct LockManager {
    entries: Mutex<AHashMap<i64, LockEntry>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
        }
    }

    /// Try to take `mode` on `key` for `txn`. A transaction already holding
    /// the lock re-acquires it freely, and a sole shared holder may upgrade
    /// to exclusive.
    pub fn acquire(&self, key: i64, txn: TransactionId, mode: LockMode) -> LockResult<()> {
        let mut entries = self.entries.lock().expect("lock table poisoned");
        let entry = entries.entry(key).or_default();

        match mode {
            LockMode::Shared => {
                if entry.exclusive && !entry.holders.contains(&txn) {
                    return Err(Self::conflict(key, entry, txn));
                }
                entry.holders.insert(txn);
                Ok(())
            }
            LockMode::Exclusive => {
                let sole_holder = entry.holders.len() == 1 && entry.holders.contains(&txn);
                if entry.holders.is_empty() || sole_holder {
                    entry.holders.insert(txn);
                    entry.exclusive = true;
                    Ok(())
                } else {
                    Err(Self::conflict(key, entry, txn))
                }
            }
        }
    }

    /// Release whatever `txn` holds on `key`
    pub fn release(&self, key: i64, txn: TransactionId) {
        let mut entries = self.entries.lock().expect("lock table poisoned");
        if let Some(entry) = entries.get_mut(&key) {
            entry.holders.remove(&txn);
            if entry.holders.is_empty() {
                entries.remove(&key);
            }
        }
    }

    /// True if any transaction holds a lock on `key`
    pub fn is_locked(&self, key: i64) -> bool {
        self.entries.lock().expect("lock table poisoned").contains_key(&key)
    }

    fn conflict(key: i64, entry: &LockEntry, txn: TransactionId) -> LockError {
        let holder = entry
            .holders
            .iter()
            .copied()
            .find(|holder| *holder != txn)
            .unwrap_or_default();
        LockError::Conflict { key, holder }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_locks_coexist() {
        let manager = LockManager::new();
        manager.acquire(1, 10, LockMode::Shared).unwrap();
        manager.acquire(1, 11, LockMode::Shared).unwrap();
        assert!(manager.is_locked(1));
    }

    #[test]
    fn test_exclusive_excludes_everyone_else() {
        let manager = LockManager::new();
        manager.acquire(1, 10, LockMode::Exclusive).unwrap();

        let err = manager.acquire(1, 11, LockMode::Exclusive).unwrap_err();
        assert!(matches!(err, LockError::Conflict { key: 1, holder: 10 }));
        let err = manager.acquire(1, 11, LockMode::Shared).unwrap_err();
        assert!(matches!(err, LockError::Conflict { key: 1, holder: 10 }));
    }

    #[test]
    fn test_shared_blocks_exclusive() {
        let manager = LockManager::new();
        manager.acquire(1, 10, LockMode::Shared).unwrap();
        assert!(manager.acquire(1, 11, LockMode::Exclusive).is_err());
    }

    #[test]
    fn test_reentrant_and_upgrade() {
        let manager = LockManager::new();
        manager.acquire(1, 10, LockMode::Shared).unwrap();
        // re-acquire and upgrade as the sole holder
        manager.acquire(1, 10, LockMode::Shared).unwrap();
        manager.acquire(1, 10, LockMode::Exclusive).unwrap();
        assert!(manager.acquire(1, 11, LockMode::Shared).is_err());
    }

    #[test]
    fn test_release_makes_key_available() {
        let manager = LockManager::new();
        manager.acquire(1, 10, LockMode::Exclusive).unwrap();
        manager.release(1, 10);
        assert!(!manager.is_locked(1));
        manager.acquire(1, 11, LockMode::Exclusive).unwrap();
    }

    #[test]
    fn test_locks_are_per_key() {
        let manager = LockManager::new();
        manager.acquire(1, 10, LockMode::Exclusive).unwrap();
        manager.acquire(2, 11, LockMode::Exclusive).unwrap();
    }
}
