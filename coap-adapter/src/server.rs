//! UDP transport loop
//!
//! ```text
//!   socket ──(mio READABLE)──► recv_from until WouldBlock
//!                                   │ copy datagram
//!                                   ▼
//!                            WorkerPool queue ──full──► drop + count
//!                                   │
//!                                   ▼
//!                        Dispatcher::serve ──► send_to(from)
//! ```
//!
//! The loop itself never waits on the authority. Transient read errors are
//! retried after a short back-off; anything else ends the loop.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};

use crate::dispatch::Dispatcher;
use crate::metrics::Metrics;
use crate::pool::{SubmitError, WorkerPool};

// ============================================================================
// Constants
// ============================================================================

/// Largest datagram accepted (bytes)
pub const MAX_PKT_LEN: usize = 1500;

/// Back-off after a transient read error
const RETRY_DELAY: Duration = Duration::from_millis(5);

/// Upper bound on how long a shutdown request goes unnoticed
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

const SOCKET_TOKEN: Token = Token(0);

// ============================================================================
// Server Structure
// ============================================================================

pub struct Server {
    poll: Poll,
    socket: Arc<UdpSocket>,
    dispatcher: Arc<Dispatcher>,
    pool: WorkerPool,
    metrics: Arc<Metrics>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(
        addr: SocketAddr,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<Metrics>,
        workers: usize,
        queue: usize,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut socket = UdpSocket::bind(addr)?;

        poll.registry()
            .register(&mut socket, SOCKET_TOKEN, Interest::READABLE)?;

        let pool = WorkerPool::new(workers, queue)?;

        log::info!(
            "CoAP adapter listening on {} ({} workers, queue {})",
            socket.local_addr()?,
            workers,
            queue
        );

        Ok(Server {
            poll,
            socket: Arc::new(socket),
            dispatcher,
            pool,
            metrics,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Flag that stops [`Server::run`] when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Serve datagrams until shutdown is requested or the socket fails
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(1024);

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            for event in events.iter() {
                if event.token() == SOCKET_TOKEN {
                    self.process_socket()?;
                }
            }
        }

        log::info!("Shutdown requested, stopping transport loop");
        Ok(())
    }

    fn process_socket(&self) -> io::Result<()> {
        let mut buf = [0u8; MAX_PKT_LEN];

        loop {
            let (len, from) = match self.socket.recv_from(&mut buf) {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    self.read_failed(e)?;
                    continue;
                }
            };

            Metrics::inc(&self.metrics.datagrams_received_total);
            log::trace!("Received {} bytes from {}", len, from);

            // Workers must not share the read buffer
            let data = buf[..len].to_vec();
            let socket = Arc::clone(&self.socket);
            let dispatcher = Arc::clone(&self.dispatcher);
            let metrics = Arc::clone(&self.metrics);

            let submitted = self.pool.try_execute(move || {
                if let Some(res) = dispatcher.serve(&data, from) {
                    respond(&socket, &metrics, &res.encode(), from);
                }
            });

            match submitted {
                Ok(()) => {}
                Err(SubmitError::Full) => {
                    log::warn!("Dispatch queue full, dropping datagram from {}", from);
                    Metrics::inc(&self.metrics.datagrams_dropped_total);
                }
                Err(SubmitError::Closed) => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        SubmitError::Closed,
                    ));
                }
            }
        }
    }

    /// Back off and return `Ok` for a transient error; anything else is
    /// returned as fatal.
    fn read_failed(&self, e: io::Error) -> io::Result<()> {
        if !is_transient(&e) {
            log::error!("Socket read failed: {}", e);
            return Err(e);
        }

        log::warn!("Transient read error: {}; retrying in {:?}", e, RETRY_DELAY);
        Metrics::inc(&self.metrics.transient_read_errors_total);
        thread::sleep(RETRY_DELAY);
        Ok(())
    }
}

fn respond(socket: &UdpSocket, metrics: &Metrics, bytes: &[u8], to: SocketAddr) {
    match socket.send_to(bytes, to) {
        Ok(_) => Metrics::inc(&metrics.responses_sent_total),
        Err(e) => log::warn!("Failed to send {} bytes to {}: {}", bytes.len(), to, e),
    }
}

/// Read errors worth retrying rather than aborting the loop
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
    )
}
