//! Remote access check
//!
//! Asks the identity authority whether a token may act on a resource. The
//! call blocks on network I/O and may time out; failures are split into
//! "authority unreachable" and "everything else".

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use auth::rpc::Response;
use auth::AuthClient;

/// Classified access check failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Authority could not be reached or did not answer in time
    Unreachable(String),
    /// Authority answered and refused, or answered nonsense
    Denied(String),
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::Unreachable(msg) => write!(f, "authority unreachable: {}", msg),
            AccessError::Denied(msg) => write!(f, "access denied: {}", msg),
        }
    }
}

impl std::error::Error for AccessError {}

/// Resolves (resource, token) to the publisher allowed to act on it
pub trait AccessChecker: Send + Sync {
    fn can_access(&self, resource_id: &str, token: &str) -> Result<String, AccessError>;
}

/// Access checker backed by the auth server's RPC
pub struct RemoteAccessClient {
    client: AuthClient,
}

impl RemoteAccessClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        RemoteAccessClient {
            client: AuthClient::new(addr, timeout),
        }
    }
}

impl AccessChecker for RemoteAccessClient {
    fn can_access(&self, resource_id: &str, token: &str) -> Result<String, AccessError> {
        match self.client.can_access(resource_id, token) {
            Ok(Response::Identity { id }) => Ok(id),
            Ok(Response::Error { kind, message }) => {
                Err(AccessError::Denied(format!("{:?}: {}", kind, message)))
            }
            Ok(other) => Err(AccessError::Denied(format!("unexpected response {:?}", other))),
            Err(e) => Err(classify(e)),
        }
    }
}

/// Connectivity failures mean the authority is unreachable; anything else
/// (corrupt frames, oversized replies) is a denial.
fn classify(err: io::Error) -> AccessError {
    match err.kind() {
        io::ErrorKind::TimedOut
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => AccessError::Unreachable(err.to_string()),
        _ => AccessError::Denied(err.to_string()),
    }
}
