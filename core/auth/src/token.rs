//! Bearer token codec
//!
//! # Format
//!
//! ```text
//! <hex(issuer)>.<id>.<hex(HMAC-SHA256(signing key, "<hex(issuer)>.<id>"))>
//! ```
//!
//! All three parts are lowercase hex, so `.` never appears inside a part.
//! The token carries enough to address the stored key; the store itself
//! never holds the token.

use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::AuthError;

/// Separator between token parts
const SEPARATOR: char = '.';

/// Length of a randomly generated signing key
const SIGNING_KEY_LEN: usize = 32;

/// The (issuer, id) pair a verified token refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub issuer: String,
    pub id: String,
}

/// Signs and verifies bearer tokens
pub struct TokenCodec {
    key: hmac::Key,
}

impl TokenCodec {
    /// Create a codec from a shared signing secret
    pub fn new(secret: &[u8]) -> Self {
        TokenCodec {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Create a codec with a random signing key.
    ///
    /// Tokens signed by it do not survive a restart.
    pub fn generate(rng: &dyn SecureRandom) -> Result<Self, AuthError> {
        let mut secret = [0u8; SIGNING_KEY_LEN];
        rng.fill(&mut secret).map_err(|_| AuthError::Rng)?;
        Ok(Self::new(&secret))
    }

    /// Produce the token for a key
    pub fn sign(&self, issuer: &str, id: &str) -> String {
        let payload = format!("{}{}{}", hex::encode(issuer), SEPARATOR, id);
        let tag = hmac::sign(&self.key, payload.as_bytes());
        format!("{}{}{}", payload, SEPARATOR, hex::encode(tag.as_ref()))
    }

    /// Verify a token and return the key it refers to.
    ///
    /// Syntax errors are `Malformed`; a well-formed token with a bad
    /// signature is `NotFound`.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let parts: Vec<&str> = token.split(SEPARATOR).collect();
        if parts.len() != 3 {
            return Err(AuthError::Malformed(format!(
                "token has {} parts, expected 3",
                parts.len()
            )));
        }
        if let Some(bad) = parts.iter().find(|p| !is_lower_hex(p)) {
            return Err(AuthError::Malformed(format!(
                "token part '{}' is not lowercase hex",
                bad
            )));
        }

        let (issuer_hex, id, tag_hex) = (parts[0], parts[1], parts[2]);

        let issuer = hex::decode(issuer_hex)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .ok_or_else(|| AuthError::Malformed("issuer is not valid UTF-8 hex".to_string()))?;
        let tag = hex::decode(tag_hex)
            .map_err(|e| AuthError::Malformed(format!("signature: {}", e)))?;

        let payload_len = issuer_hex.len() + 1 + id.len();
        hmac::verify(&self.key, &token.as_bytes()[..payload_len], &tag)
            .map_err(|_| AuthError::NotFound)?;

        Ok(Claims {
            issuer,
            id: id.to_string(),
        })
    }
}

/// Generate a random lowercase-hex identifier of `len` bytes
pub fn random_id(rng: &SystemRandom, len: usize) -> Result<String, AuthError> {
    let mut raw = vec![0u8; len];
    rng.fill(&mut raw).map_err(|_| AuthError::Rng)?;
    Ok(hex::encode(raw))
}

fn is_lower_hex(part: &str) -> bool {
    !part.is_empty()
        && part
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
