//! Key records and issuance parameters

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::error::AuthError;

// ============================================================================
// Key Type
// ============================================================================

/// Kind of issued key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum KeyType {
    /// Key held by a user or device acting on its own behalf
    User = 0,
    /// Key held by a backend service
    Service = 1,
}

impl TryFrom<u32> for KeyType {
    type Error = AuthError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(KeyType::User),
            1 => Ok(KeyType::Service),
            other => Err(AuthError::Malformed(format!("unknown key type {}", other))),
        }
    }
}

// ============================================================================
// Key
// ============================================================================

/// An issued credential.
///
/// `secret` is only populated on the value returned from issuance. Stored
/// records never carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub id: String,
    pub issuer: String,
    pub key_type: KeyType,
    pub issued_at: SystemTime,
    pub expires_at: Option<SystemTime>,
    pub secret: Option<String>,
}

impl Key {
    /// Whether the key's lifetime has passed at `now`
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }

    /// Copy of this key with the bearer secret dropped
    pub fn without_secret(&self) -> Key {
        Key {
            secret: None,
            ..self.clone()
        }
    }
}

// ============================================================================
// Key Spec
// ============================================================================

/// Caller-supplied parameters for issuing a key.
///
/// `key_type` is kept as the raw wire value so that issuance can reject
/// unknown types with a validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpec {
    pub key_type: u32,
    pub ttl: Option<Duration>,
}

impl KeySpec {
    pub fn new(key_type: u32) -> Self {
        KeySpec {
            key_type,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Check the request fields and return the parsed key type
    pub fn validate(&self) -> Result<KeyType, AuthError> {
        let key_type = KeyType::try_from(self.key_type)?;
        if self.ttl == Some(Duration::ZERO) {
            return Err(AuthError::Malformed("ttl must be positive".to_string()));
        }
        Ok(key_type)
    }
}
