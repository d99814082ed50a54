//! Identity service
//!
//! Facade over a [`KeyRepository`]: issues keys, resolves presented tokens
//! back to the issuing identity, and revokes keys.

use std::time::SystemTime;

use ring::rand::SystemRandom;

use crate::error::AuthError;
use crate::key::{Key, KeySpec};
use crate::repository::KeyRepository;
use crate::token::{self, TokenCodec};

/// Number of random bytes in a key ID
const KEY_ID_LEN: usize = 16;

/// Key issuance and identity resolution
pub trait IdentityService: Send + Sync {
    /// Issue a new key for `issuer`. The returned key is the only place the
    /// secret is ever exposed.
    fn issue(&self, issuer: &str, spec: KeySpec) -> Result<Key, AuthError>;

    /// Resolve a token to the identity that owns it
    fn identify(&self, token: &str) -> Result<String, AuthError>;

    /// Look up a key without its secret
    fn retrieve(&self, issuer: &str, id: &str) -> Result<Key, AuthError>;

    /// Delete a key. Idempotent.
    fn revoke(&self, issuer: &str, id: &str) -> Result<(), AuthError>;
}

/// Default identity service backed by a key repository
pub struct AuthService<R: KeyRepository> {
    repo: R,
    tokens: TokenCodec,
    rng: SystemRandom,
}

impl<R: KeyRepository> AuthService<R> {
    pub fn new(repo: R, tokens: TokenCodec) -> Self {
        AuthService {
            repo,
            tokens,
            rng: SystemRandom::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }
}

impl<R: KeyRepository> IdentityService for AuthService<R> {
    fn issue(&self, issuer: &str, spec: KeySpec) -> Result<Key, AuthError> {
        if issuer.is_empty() {
            return Err(AuthError::Malformed("issuer must not be empty".to_string()));
        }
        let key_type = spec.validate()?;

        let issued_at = SystemTime::now();
        let expires_at = match spec.ttl {
            Some(ttl) => Some(
                issued_at
                    .checked_add(ttl)
                    .ok_or_else(|| AuthError::Malformed(format!("ttl {:?} out of range", ttl)))?,
            ),
            None => None,
        };

        let id = token::random_id(&self.rng, KEY_ID_LEN)?;
        let key = Key {
            secret: Some(self.tokens.sign(issuer, &id)),
            id,
            issuer: issuer.to_string(),
            key_type,
            issued_at,
            expires_at,
        };

        self.repo.save(key.without_secret())?;
        log::info!("Issued {:?} key {} for '{}'", key.key_type, key.id, issuer);

        Ok(key)
    }

    fn identify(&self, token: &str) -> Result<String, AuthError> {
        let claims = self.tokens.verify(token)?;
        let key = self.repo.retrieve(&claims.issuer, &claims.id)?;

        if key.is_expired_at(SystemTime::now()) {
            log::debug!("Rejected expired key {} for '{}'", key.id, key.issuer);
            return Err(AuthError::Expired);
        }

        Ok(key.issuer)
    }

    fn retrieve(&self, issuer: &str, id: &str) -> Result<Key, AuthError> {
        self.repo.retrieve(issuer, id)
    }

    fn revoke(&self, issuer: &str, id: &str) -> Result<(), AuthError> {
        self.repo.remove(issuer, id)?;
        log::info!("Revoked key {} for '{}'", id, issuer);
        Ok(())
    }
}
