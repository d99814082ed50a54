//! CoAP Adapter entry point

use std::sync::Arc;

use coap_adapter::access::RemoteAccessClient;
use coap_adapter::config::Config;
use coap_adapter::dispatch::Dispatcher;
use coap_adapter::handler::ObserveHandler;
use coap_adapter::metrics::Metrics;
use coap_adapter::server::Server;
use coap_adapter::subscription::Registry;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let cfg = Config::from_args(&args)?;

    log::info!("CoAP Adapter starting...");
    log::info!("  Listen: {}", cfg.listen);
    log::info!("  Auth server: {} (timeout {:?})", cfg.auth_addr, cfg.auth_timeout);
    log::info!("  Workers: {}, queue: {}", cfg.workers, cfg.queue);

    let access = Arc::new(RemoteAccessClient::new(cfg.auth_addr, cfg.auth_timeout));
    let registry = Arc::new(Registry::new());
    let metrics = Arc::new(Metrics::new());
    let handler = Arc::new(ObserveHandler::new(
        access.clone(),
        Arc::clone(&registry),
        Arc::clone(&metrics),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        access,
        handler,
        Arc::clone(&metrics),
    ));

    let mut server = Server::bind(
        cfg.listen,
        dispatcher,
        Arc::clone(&metrics),
        cfg.workers,
        cfg.queue,
    )?;

    let shutdown = server.shutdown_handle();
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;

    let result = server.run();

    // Join workers before the final report
    drop(server);
    log::info!(
        "Stopped with {} active subscriptions\n{}",
        registry.len(),
        metrics.render()
    );

    result?;
    Ok(())
}
