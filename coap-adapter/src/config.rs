//! Command-line configuration for the CoAP adapter

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Default CoAP listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:5683";

/// Default auth server address
pub const DEFAULT_AUTH: &str = "127.0.0.1:8181";

pub const DEFAULT_WORKERS: usize = 8;

pub const DEFAULT_QUEUE: usize = 1024;

pub const DEFAULT_AUTH_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// UDP address the adapter binds to
    pub listen: SocketAddr,
    /// Auth server RPC address
    pub auth_addr: SocketAddr,
    /// Dispatch worker threads
    pub workers: usize,
    /// Datagrams that may wait for a worker
    pub queue: usize,
    /// Per-call timeout for the auth server
    pub auth_timeout: Duration,
}

/// Invalid command-line value
#[derive(Debug)]
pub struct ConfigError {
    pub flag: &'static str,
    pub value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value for {}: '{}'", self.flag, self.value)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    // Usage: coap-adapter [--listen <addr:port>] [--auth <addr:port>]
    //                     [--workers <n>] [--queue <n>] [--auth-timeout-ms <ms>]
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let listen: SocketAddr = parse_flag(args, "--listen", DEFAULT_LISTEN.parse().ok())?;
        let auth_addr: SocketAddr = parse_flag(args, "--auth", DEFAULT_AUTH.parse().ok())?;
        let workers = parse_positive(args, "--workers", DEFAULT_WORKERS)?;
        let queue = parse_positive(args, "--queue", DEFAULT_QUEUE)?;
        let timeout_ms = parse_positive(args, "--auth-timeout-ms", DEFAULT_AUTH_TIMEOUT_MS)?;

        Ok(Config {
            listen,
            auth_addr,
            workers,
            queue,
            auth_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

fn parse_flag<T: std::str::FromStr>(
    args: &[String],
    flag: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError> {
    match parse_arg(args, flag) {
        Some(value) => value.parse().map_err(|_| ConfigError { flag, value }),
        None => default.ok_or(ConfigError {
            flag,
            value: String::new(),
        }),
    }
}

/// Numeric flag that must be at least 1
fn parse_positive<T>(args: &[String], flag: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let value = parse_flag(args, flag, Some(default))?;
    if value < T::from(1) {
        return Err(ConfigError {
            flag,
            value: parse_arg(args, flag).unwrap_or_default(),
        });
    }
    Ok(value)
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
