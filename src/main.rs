//! Mock Signal Server binary
//!
//! Thin harness around the library: initialize logging, load the certificate
//! seeds, bind, and serve until interrupted. Intended for running clients
//! against a long-lived local instance; integration tests embed the server
//! in-process instead.

use std::path::PathBuf;

use tracing::{error, info};

use signal_mock_server::{Server, ServerConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("signal_mock_server=info".parse().unwrap()),
        )
        .init();

    let certs_dir = std::env::var("SIGNAL_MOCK_CERTS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("certs"));

    let config = match ServerConfig::load(&certs_dir) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting mock Signal server v{}",
        env!("CARGO_PKG_VERSION")
    );
    if config.tls.is_some() {
        info!("TLS: enabled");
    } else {
        info!("TLS: disabled (plain HTTP/WS)");
    }

    let listen_addr = config.listen_addr;
    let server = match Server::new(config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to construct server: {}", e);
            std::process::exit(1);
        }
    };

    match server.listen(listen_addr).await {
        Ok(addr) => info!("Serving on {}", addr),
        Err(e) => {
            error!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for shutdown signal: {}", e);
    }
    info!("Shutting down");
    server.close();
}
