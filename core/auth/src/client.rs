//! Blocking RPC client for the auth server

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use crate::rpc::{self, Request, Response};

/// Client for the auth server.
///
/// Each call opens its own connection, so one client can be shared across
/// threads without coordination.
#[derive(Debug, Clone)]
pub struct AuthClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl AuthClient {
    /// `timeout` bounds the connect and each read/write on the connection
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        AuthClient { addr, timeout }
    }

    /// Send one request and wait for its response
    pub fn call(&self, req: &Request) -> io::Result<Response> {
        let mut stream = TcpStream::connect_timeout(&self.addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;

        rpc::write_frame(&mut stream, req)?;
        rpc::read_frame(&mut stream)
    }

    pub fn issue(&self, issuer: &str, key_type: u32) -> io::Result<Response> {
        self.call(&Request::Issue {
            issuer: issuer.to_string(),
            key_type,
        })
    }

    pub fn identify(&self, token: &str) -> io::Result<Response> {
        self.call(&Request::Identify {
            token: token.to_string(),
        })
    }

    pub fn can_access(&self, resource_id: &str, token: &str) -> io::Result<Response> {
        self.call(&Request::CanAccess {
            resource_id: resource_id.to_string(),
            token: token.to_string(),
        })
    }

    pub fn revoke(&self, issuer: &str, id: &str) -> io::Result<Response> {
        self.call(&Request::Revoke {
            issuer: issuer.to_string(),
            id: id.to_string(),
        })
    }
}
