//! TCP accept loop for the auth server
//!
//! The listener is polled for readiness with mio and drained on each
//! wakeup. One thread per connection. Each connection carries a sequence of
//! request/response frames until the peer closes it or goes idle.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use auth::rpc::{self, Request, Response};
use auth::IdentityService;
use mio::{Events, Interest, Poll, Token};

use crate::endpoint;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on how long a shutdown request goes unnoticed
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Idle connections are closed after this long without a request
const CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// mio token for the listening socket
const LISTENER_TOKEN: Token = Token(0);

// ============================================================================
// Server Structure
// ============================================================================

pub struct Server {
    poll: Poll,
    /// Registered with `poll` for readiness only
    _readiness: mio::net::TcpListener,
    /// Same socket; accepted streams come out as blocking std streams
    listener: TcpListener,
    service: Arc<dyn IdentityService>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(addr: SocketAddr, service: Arc<dyn IdentityService>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let poll = Poll::new()?;
        let mut readiness = mio::net::TcpListener::from_std(listener.try_clone()?);
        poll.registry()
            .register(&mut readiness, LISTENER_TOKEN, Interest::READABLE)?;

        log::info!("Auth server listening on {}", listener.local_addr()?);

        Ok(Server {
            poll,
            _readiness: readiness,
            listener,
            service,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Flag that stops [`Server::run`] when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Accept connections until shutdown is requested
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(128);

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            for event in events.iter() {
                if event.token() == LISTENER_TOKEN {
                    self.accept_pending()?;
                }
            }
        }

        log::info!("Auth server shutting down");
        Ok(())
    }

    /// Accept until the backlog is empty
    fn accept_pending(&self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    log::debug!("Transient accept error: {}", e);
                }
                Err(e) => {
                    log::error!("Accept failed: {}", e);
                    return Err(e);
                }
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let service = Arc::clone(&self.service);
        let spawned = thread::Builder::new()
            .name(format!("rpc-{}", peer))
            .spawn(move || {
                if let Err(e) = serve_connection(stream, service.as_ref()) {
                    log::debug!("Connection from {} ended: {}", peer, e);
                }
            });

        if let Err(e) = spawned {
            log::error!("Failed to spawn handler for {}: {}", peer, e);
        }
    }
}

fn serve_connection(mut stream: TcpStream, service: &dyn IdentityService) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CONNECTION_IDLE_TIMEOUT))?;
    stream.set_nodelay(true)?;

    loop {
        let req: Request = match rpc::read_frame(&mut stream) {
            Ok(req) => req,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };

        log::trace!("RPC request: {:?}", req);
        let res: Response = endpoint::handle(service, req);
        rpc::write_frame(&mut stream, &res)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::{AuthService, InMemoryKeyRepository, TokenCodec};

    fn make_server() -> Server {
        let service = Arc::new(AuthService::new(
            InMemoryKeyRepository::new(),
            TokenCodec::new(b"server-test"),
        ));
        Server::bind("127.0.0.1:0".parse().unwrap(), service).unwrap()
    }

    #[test]
    fn test_run_returns_once_shutdown_set() {
        let mut server = make_server();
        server.shutdown_handle().store(true, Ordering::Relaxed);
        assert!(server.run().is_ok());
    }

    #[test]
    fn test_serves_connection_after_wakeup() {
        let mut server = make_server();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = thread::spawn(move || server.run());

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        rpc::write_frame(&mut stream, &Request::Identify { token: "nope".to_string() }).unwrap();
        let res: Response = rpc::read_frame(&mut stream).unwrap();
        assert!(matches!(res, Response::Error { .. }));

        shutdown.store(true, Ordering::Relaxed);
        assert!(handle.join().unwrap().is_ok());
    }
}
