//! Auth Server
//!
//! A TCP server that:
//! - Issues keys and hands their bearer token back once
//! - Resolves tokens to the identity that owns them
//! - Answers access checks from the CoAP adapter
//! - Revokes keys

pub mod config;
pub mod endpoint;
pub mod server;
