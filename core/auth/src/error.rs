//! Errors raised by the key store and identity service

use std::fmt;

/// Errors from key issuance, lookup and token verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A key with the same (issuer, id) already exists
    Conflict,
    /// No key matches the lookup, or the token does not resolve to one
    NotFound,
    /// Request or token failed validation
    Malformed(String),
    /// Key exists but its lifetime has passed
    Expired,
    /// System random generator failed
    Rng,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Conflict => write!(f, "entity already exists"),
            AuthError::NotFound => write!(f, "entity not found"),
            AuthError::Malformed(msg) => write!(f, "malformed entity: {}", msg),
            AuthError::Expired => write!(f, "key has expired"),
            AuthError::Rng => write!(f, "failed to generate random bytes"),
        }
    }
}

impl std::error::Error for AuthError {}
