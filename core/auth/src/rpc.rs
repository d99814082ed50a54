//! RPC messages between the CoAP adapter and the auth server
//!
//! # Framing
//!
//! ```text
//! +--------+--------+--------+--------+-------------------------+
//! | Payload length (4 bytes, BE)      | bincode payload ...     |
//! +--------+--------+--------+--------+-------------------------+
//! ```
//!
//! One request frame is answered by exactly one response frame. A
//! connection may carry any number of request/response pairs.

use std::io::{self, Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

// ============================================================================
// Constants
// ============================================================================

/// Maximum RPC payload size (64 KB)
pub const MAX_MESSAGE_SIZE: u32 = 65536;

/// Length of frame header (4 bytes for length)
pub const HEADER_LEN: usize = 4;

// ============================================================================
// Messages
// ============================================================================

/// Requests accepted by the auth server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    /// Issue a new key on behalf of `issuer`
    Issue { issuer: String, key_type: u32 },

    /// Resolve a token to its owner
    Identify { token: String },

    /// Check that `token` may act on `resource_id`; answers with the
    /// publisher identity
    CanAccess { resource_id: String, token: String },

    /// Delete a key
    Revoke { issuer: String, id: String },
}

impl Request {
    /// Check the request shape before it reaches the identity service
    pub fn validate(&self) -> Result<(), AuthError> {
        match self {
            Request::Issue { issuer, .. } | Request::Revoke { issuer, .. } if issuer.is_empty() => {
                Err(AuthError::Malformed("missing issuer".to_string()))
            }
            Request::Revoke { id, .. } if id.is_empty() => {
                Err(AuthError::Malformed("missing key id".to_string()))
            }
            Request::Identify { token } | Request::CanAccess { token, .. } if token.is_empty() => {
                Err(AuthError::Malformed("missing token".to_string()))
            }
            Request::CanAccess { resource_id, .. } if resource_id.is_empty() => {
                Err(AuthError::Malformed("missing resource id".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Responses sent by the auth server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Key issued; `secret` is the bearer token
    Issued { id: String, secret: String },

    /// Token resolved to this identity
    Identity { id: String },

    /// Key revoked (or never existed)
    Revoked,

    /// Request failed
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn error(err: &AuthError) -> Self {
        Response::Error {
            kind: ErrorKind::from(err),
            message: err.to_string(),
        }
    }
}

/// Error classes carried in [`Response::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorKind {
    Malformed = 0,
    NotFound = 1,
    Conflict = 2,
    Expired = 3,
    Internal = 4,
}

impl From<&AuthError> for ErrorKind {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Malformed(_) => ErrorKind::Malformed,
            AuthError::NotFound => ErrorKind::NotFound,
            AuthError::Conflict => ErrorKind::Conflict,
            AuthError::Expired => ErrorKind::Expired,
            AuthError::Rng => ErrorKind::Internal,
        }
    }
}

// ============================================================================
// Encoding/Decoding
// ============================================================================

/// Encode a message with 4-byte length prefix
pub fn encode_message<T: Serialize>(msg: &T) -> Result<Vec<u8>, String> {
    let payload = bincode::serialize(msg).map_err(|e| e.to_string())?;

    if payload.len() > MAX_MESSAGE_SIZE as usize {
        return Err(format!("message too large: {} bytes", payload.len()));
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);

    Ok(buf)
}

/// Write one framed message to a stream
pub fn write_frame<W: Write, T: Serialize>(w: &mut W, msg: &T) -> io::Result<()> {
    let buf = encode_message(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    w.write_all(&buf)?;
    w.flush()
}

/// Read one framed message from a stream.
///
/// A clean close before the header yields `UnexpectedEof`.
pub fn read_frame<R: Read, T: DeserializeOwned>(r: &mut R) -> io::Result<T> {
    let mut header = [0u8; HEADER_LEN];
    r.read_exact(&mut header)?;

    let length = u32::from_be_bytes(header);
    if length > MAX_MESSAGE_SIZE {
        return Err(DecodeError::TooLarge(length as usize).into());
    }

    // The header is checked before the payload buffer is allocated
    let mut payload = vec![0u8; length as usize];
    r.read_exact(&mut payload)?;

    bincode::deserialize(&payload).map_err(|e| DecodeError::Invalid(e.to_string()).into())
}

/// Frame contents that can never become a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Declared payload length over [`MAX_MESSAGE_SIZE`]
    TooLarge(usize),
    /// Payload is not a valid bincode message
    Invalid(String),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::TooLarge(n) => write!(f, "frame too large: {} bytes", n),
            DecodeError::Invalid(msg) => write!(f, "invalid frame: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for io::Error {
    fn from(err: DecodeError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}
