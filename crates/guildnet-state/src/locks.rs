//! Keyed mutex registry.
//!
//! Mission transitions and per-agent queue writes must be linearised per key
//! while staying independent across keys. Guards are plain `std` mutexes —
//! the critical sections never await.
//!
//! Usage: hold the returned `Arc` in a local, then lock it:
//! ```ignore
//! let lock = locks.lock_for(mission_id.as_bytes());
//! let _guard = lock.lock().unwrap();
//! // linearised section
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A table of named locks, one per 32-byte key. Cheap to clone.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<Mutex<HashMap<[u8; 32], Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (or create) the lock for `key`.
    pub fn lock_for(&self, key: &[u8; 32]) -> Arc<Mutex<()>> {
        let mut table = self.inner.lock().unwrap();
        table.entry(*key).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_serialises_distinct_keys_do_not() {
        let locks = KeyedLocks::new();
        let a = locks.lock_for(&[1u8; 32]);
        let b = locks.lock_for(&[1u8; 32]);
        assert!(Arc::ptr_eq(&a, &b));

        let c = locks.lock_for(&[2u8; 32]);
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn held_guard_blocks_try_lock() {
        let locks = KeyedLocks::new();
        let lock = locks.lock_for(&[3u8; 32]);
        let guard = lock.lock().unwrap();
        assert!(locks.lock_for(&[3u8; 32]).try_lock().is_err());
        drop(guard);
        assert!(locks.lock_for(&[3u8; 32]).try_lock().is_ok());
    }
}
