//! Key lifecycle and identity verification
//!
//! This crate is shared by both server components:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       auth crate                            │
//! ├────────────────────────────────────────────────────────────┤
//! │  key.rs         - Key record, key types, issuance spec      │
//! │  repository.rs  - Key store trait + in-memory store         │
//! │  token.rs       - Signed bearer token codec                 │
//! │  service.rs     - Identity service (issue/identify/revoke)  │
//! │  rpc.rs         - Length-prefixed RPC messages              │
//! │  client.rs      - Blocking RPC client                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The auth server owns a [`service::AuthService`]; the CoAP adapter only
//! speaks [`rpc`] through [`client::AuthClient`].

pub mod client;
pub mod error;
pub mod key;
pub mod repository;
pub mod rpc;
pub mod service;
pub mod token;

pub use client::AuthClient;
pub use error::AuthError;
pub use key::{Key, KeySpec, KeyType};
pub use repository::{InMemoryKeyRepository, KeyRepository};
pub use service::{AuthService, IdentityService};
pub use token::TokenCodec;
