//! Auth Server entry point

use std::sync::Arc;

use auth::{AuthService, InMemoryKeyRepository, TokenCodec};
use auth_server::config::{self, Config};
use auth_server::server::Server;
use ring::rand::SystemRandom;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let cfg = Config::from_args(&args, std::env::var(config::SECRET_ENV).ok())?;

    log::info!("Auth Server starting...");
    log::info!("  Listen: {}", cfg.listen);
    log::info!("  Secret: {}", if cfg.secret.is_some() { "configured" } else { "random" });

    let tokens = match &cfg.secret {
        Some(secret) => TokenCodec::new(secret.as_bytes()),
        None => {
            log::warn!(
                "No signing secret set ({} or --secret); issued tokens will not survive a restart",
                config::SECRET_ENV
            );
            TokenCodec::generate(&SystemRandom::new())?
        }
    };

    let service = Arc::new(AuthService::new(InMemoryKeyRepository::new(), tokens));
    let mut server = Server::bind(cfg.listen, service)?;

    let shutdown = server.shutdown_handle();
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;

    server.run()?;
    Ok(())
}
