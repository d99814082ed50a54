//! CoAP Adapter
//!
//! A UDP server that sits in front of the CoAP protocol handler:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    coap-adapter crate                      │
//! ├────────────────────────────────────────────────────────────┤
//! │  server.rs       - mio UDP loop, hands datagrams to pool   │
//! │  pool.rs         - Bounded worker pool                     │
//! │  dispatch.rs     - Reset teardown vs. handler routing      │
//! │  auth.rs         - key=<token> extraction + authorization  │
//! │  access.rs       - Access check against the auth server    │
//! │  handler.rs      - Default observe-aware handler           │
//! │  subscription.rs - Subscription IDs and registry           │
//! │  message.rs      - CoAP (RFC 7252) message codec           │
//! │  metrics.rs      - Counters, rendered at shutdown          │
//! │  config.rs       - Command-line flags                      │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod access;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod handler;
pub mod message;
pub mod metrics;
pub mod pool;
pub mod server;
pub mod subscription;
