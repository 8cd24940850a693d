#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use nightfall_server::config;
use nightfall_server::logging;
use nightfall_server::server::Gateway;
use nightfall_server::websocket;
use std::net::SocketAddr;

/// Nightfall: authoritative session server for a one-night hidden-role game
#[derive(Parser, Debug)]
#[command(name = "nightfall-server")]
#[command(about = "Authoritative WebSocket session server for a one-night hidden-role game")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    /// Useful for debugging configuration loading from multiple sources.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json / env if present; defaults otherwise.
    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    // load() only warns on validation problems; capture the result here
    // so --validate-config gets a real exit code and normal startup
    // refuses a broken config.
    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Host: {}", cfg.host);
                println!("  Port: {}", cfg.port);
                println!("  Max rooms: {}", cfg.server.max_rooms);
                println!("  Grace period: {} ms", cfg.server.grace_period_ms);
                println!("  Ping interval: {} ms", cfg.server.ping_interval_ms);
                println!("  Max message size: {} bytes", cfg.server.max_message_bytes);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result.map_err(|e| anyhow::anyhow!("invalid configuration:\n{e}"))?;

    logging::init_with_config(&cfg.logging);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid host/port: {e}"))?;

    tracing::info!(%addr, "Starting Nightfall server");

    let cors_origins = cfg.cors_origins.clone();
    let gateway = Gateway::new(cfg);
    let router = websocket::create_router(gateway.clone(), &cors_origins);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Server started - WebSocket protocol on /ws");

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    serve.await?;

    // Sockets are gone; tell any remaining rooms why.
    gateway.rooms.close_all("Server shutting down").await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown signal handler");
    }
    tracing::info!("Shutdown signal received");
}
