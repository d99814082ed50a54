//! Command-line configuration for the auth server

use std::fmt;
use std::net::SocketAddr;

/// Default listen address
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8181";

/// Environment variable holding the token signing secret
pub const SECRET_ENV: &str = "AUTH_SECRET";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the RPC listener binds to
    pub listen: SocketAddr,
    /// Token signing secret. None = random per process.
    pub secret: Option<String>,
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
    /// Build the config from `std::env::args()`-style arguments.
    ///
    /// ```text
    /// --listen <addr:port>  RPC listen address
    /// --secret <string>     Token signing secret (wins over `env_secret`)
    /// ```
    pub fn from_args(args: &[String], env_secret: Option<String>) -> Result<Self, ConfigError> {
        let listen = parse_arg(args, "--listen").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen.parse().map_err(|_| ConfigError {
            flag: "--listen",
            value: listen.clone(),
        })?;

        let secret = parse_arg(args, "--secret")
            .or(env_secret)
            .filter(|s| !s.is_empty());

        Ok(Config { listen, secret })
    }
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("auth-server")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_args(&args(&[]), None).unwrap();
        assert_eq!(cfg.listen, DEFAULT_LISTEN.parse().unwrap());
        assert_eq!(cfg.secret, None);
    }

    #[test]
    fn test_flags() {
        let cfg = Config::from_args(&args(&["--listen", "127.0.0.1:9000", "--secret", "s"]), None)
            .unwrap();
        assert_eq!(cfg.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(cfg.secret.as_deref(), Some("s"));
    }

    #[test]
    fn test_secret_from_env() {
        let cfg = Config::from_args(&args(&[]), Some("from-env".to_string())).unwrap();
        assert_eq!(cfg.secret.as_deref(), Some("from-env"));

        let cfg = Config::from_args(&args(&["--secret", "flag"]), Some("env".to_string())).unwrap();
        assert_eq!(cfg.secret.as_deref(), Some("flag"));
    }

    #[test]
    fn test_empty_secret_ignored() {
        let cfg = Config::from_args(&args(&[]), Some(String::new())).unwrap();
        assert_eq!(cfg.secret, None);
    }

    #[test]
    fn test_invalid_listen() {
        let err = Config::from_args(&args(&["--listen", "nope"]), None).unwrap_err();
        assert_eq!(err.flag, "--listen");
        assert_eq!(err.value, "nope");
    }
}
