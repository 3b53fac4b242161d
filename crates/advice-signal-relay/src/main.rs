//! Advice marketplace signaling relay — entry point.
//!
//! Accepts WebSocket connections from marketplace clients, lets each one
//! register an identity, and relays call-setup envelopes (offer, answer, ICE
//! candidates) between identities.  Dead peers are detected with WebSocket
//! Ping/Pong and dropped.
//!
//! # Usage
//!
//! ```text
//! advice-signal-relay [OPTIONS]
//!
//! Options:
//!   --bind           <IP>    Address to listen on [default: 0.0.0.0]
//!   --port           <PORT>  Listener port [default: 5000]
//!   --ws-path        <PATH>  WebSocket endpoint path [default: /ws]
//!   --probe-interval <SECS>  Liveness probe interval in seconds [default: 30]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Default   | Description                     |
//! |------------------------|-----------|---------------------------------|
//! | `RELAY_BIND`           | `0.0.0.0` | Listener IP address             |
//! | `RELAY_PORT`           | `5000`    | Listener port                   |
//! | `RELAY_WS_PATH`        | `/ws`     | WebSocket endpoint path         |
//! | `RELAY_PROBE_INTERVAL` | `30`      | Liveness probe interval (secs)  |
//!
//! CLI args take precedence when both are present.  Log verbosity follows
//! `RUST_LOG` (default `info`).

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use advice_signal_relay::domain::RelayConfig;
use advice_signal_relay::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Advice marketplace WebSocket signaling relay.
#[derive(Debug, Parser)]
#[command(
    name = "advice-signal-relay",
    about = "WebSocket signaling relay for advice marketplace calls",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket server to.
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_BIND")]
    bind: String,

    /// TCP port for the WebSocket server.
    #[arg(long, default_value_t = 5000, env = "RELAY_PORT")]
    port: u16,

    /// Request path clients connect to (ws://host:PORT/PATH).
    #[arg(long, default_value = "/ws", env = "RELAY_WS_PATH")]
    ws_path: String,

    /// Liveness probe interval in seconds.
    ///
    /// A client that misses one probe is dropped on the following tick.
    #[arg(long, default_value_t = 30, env = "RELAY_PROBE_INTERVAL")]
    probe_interval: u64,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not an IP address, `--ws-path` does not
    /// start with `/`, or `--probe-interval` is zero.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let bind_addr: SocketAddr = format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.bind, self.port))?;

        if !self.ws_path.starts_with('/') {
            anyhow::bail!("invalid WebSocket path '{}': must start with '/'", self.ws_path);
        }

        if self.probe_interval == 0 {
            anyhow::bail!("--probe-interval must be at least 1 second");
        }

        Ok(RelayConfig {
            bind_addr,
            ws_path: self.ws_path,
            probe_interval: Duration::from_secs(self.probe_interval),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_relay_config()?;

    info!(
        "signaling relay starting — bind={}, path={}, probe_interval={:?}",
        config.bind_addr, config.ws_path, config.probe_interval
    );

    // Cleared by Ctrl+C; the accept loop polls it and then stops the relay.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("signaling relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
