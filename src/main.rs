//! bulletin: a telnet-style bulletin board server
//!
//! Clients connect over TCP, log in (or register) and exchange
//! newline-terminated commands: post messages, read them back, ask for
//! help, leave. Telnet negotiation bytes are stripped transparently.
//!
//! Features:
//! - Message board with flat-file persistence
//! - User registration with a JSON credential store
//! - Templated MOTD banner
//! - Graceful shutdown draining every live session
//! - Configuration via CLI arguments or TOML file

mod command;
mod config;
mod framer;
mod motd;
mod server;
mod session;
mod storage;
mod users;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging; the debug flag forces verbose duty logging
    let level = if config.debug {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        max_messages = config.max_messages,
        max_read_messages = config.max_read_messages,
        "Starting bulletin board server"
    );

    let server = Server::new(config);

    // Ctrl-C triggers the one-shot shutdown signal; the server returns
    // once every session has drained.
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}
