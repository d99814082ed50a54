//! Key storage
//!
//! Keys are addressed by the (issuer, id) pair. The issuer is part of every
//! lookup: a record stored under another issuer is invisible, and removing
//! it is a silent no-op.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::AuthError;
use crate::key::Key;

// ============================================================================
// Repository Trait
// ============================================================================

/// Storage backend for issued keys
pub trait KeyRepository: Send + Sync {
    /// Insert a key. Fails with `Conflict` if (issuer, id) already exists.
    fn save(&self, key: Key) -> Result<String, AuthError>;

    /// Look up a key by id, visible only to its issuer
    fn retrieve(&self, issuer: &str, id: &str) -> Result<Key, AuthError>;

    /// Delete a key if it belongs to `issuer`. Idempotent.
    fn remove(&self, issuer: &str, id: &str) -> Result<(), AuthError>;
}

// ============================================================================
// In-Memory Repository
// ============================================================================

/// In-memory key store guarded by a single lock.
///
/// Every operation holds the lock for its whole duration, so each call is
/// atomic with respect to the others.
pub struct InMemoryKeyRepository {
    /// issuer -> (id -> key)
    keys: Mutex<HashMap<String, HashMap<String, Key>>>,
}

impl InMemoryKeyRepository {
    pub fn new() -> Self {
        InMemoryKeyRepository {
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Total number of stored keys across all issuers
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a half-written entry
    // behind, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, Key>>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryKeyRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyRepository for InMemoryKeyRepository {
    fn save(&self, key: Key) -> Result<String, AuthError> {
        let mut keys = self.lock();
        let by_id = keys.entry(key.issuer.clone()).or_default();

        if by_id.contains_key(&key.id) {
            return Err(AuthError::Conflict);
        }

        let id = key.id.clone();
        log::trace!("Saved key {} for issuer '{}'", id, key.issuer);
        by_id.insert(id.clone(), key);
        Ok(id)
    }

    fn retrieve(&self, issuer: &str, id: &str) -> Result<Key, AuthError> {
        self.lock()
            .get(issuer)
            .and_then(|by_id| by_id.get(id))
            .cloned()
            .ok_or(AuthError::NotFound)
    }

    fn remove(&self, issuer: &str, id: &str) -> Result<(), AuthError> {
        let mut keys = self.lock();

        if let Some(by_id) = keys.get_mut(issuer) {
            if by_id.remove(id).is_some() {
                log::trace!("Removed key {} for issuer '{}'", id, issuer);
            }
            if by_id.is_empty() {
                keys.remove(issuer);
            }
        }

        Ok(())
    }
}
