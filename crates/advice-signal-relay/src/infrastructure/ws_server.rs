//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections.
//! 3. Upgrading each connection to a WebSocket session, rejecting upgrade
//!    requests for any path other than the configured one.
//! 4. Running two concurrent halves per connection:
//!    - **Reader**: socket frames → [`RelayHandle`] commands.
//!    - **Writer**: [`Outbound`] queue → socket frames.
//! 5. Stopping the relay task when the `running` flag is cleared.
//!
//! The connection ends as soon as either half finishes or the relay fires
//! the connection's terminate signal.  Both halves share the socket, so
//! dropping them together closes it.  The terminate signal is raced against
//! the halves rather than queued, so it wins even while a write to a stalled
//! peer is pending.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::StatusCode,
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use crate::application::{
    ConnectionEnd, ConnectionLink, Outbound, RelayError, RelayHandle, OUTBOUND_QUEUE_CAPACITY,
};
use crate::domain::config::RelayConfig;
use crate::domain::messages::ConnectionId;
use crate::infrastructure::relay_task::spawn_relay;

/// How often the accept loop re-checks the `running` flag when idle.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound but not yet running relay server.
///
/// Splitting bind from run lets callers learn the actual port (useful when
/// binding port 0 in tests) before any client connects.
pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
}

impl RelayServer {
    /// Binds the WebSocket listener on `config.bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is already in use or the process lacks
    /// permission to bind it.
    pub async fn bind(config: RelayConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("failed to read listener address")
    }

    /// Runs the accept loop until `running` is set to `false`, then stops the
    /// relay (terminating every connection) and waits for it to finish.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let local_addr = self.local_addr()?;
        info!(
            "signaling relay listening on ws://{local_addr}{}",
            self.config.ws_path
        );

        let (relay, relay_task) = spawn_relay(self.config.probe_interval);
        let ws_path: Arc<str> = Arc::from(self.config.ws_path.as_str());

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    debug!("new connection from {peer_addr}");
                    let relay = relay.clone();
                    let ws_path = Arc::clone(&ws_path);
                    tokio::spawn(async move {
                        handle_client(stream, peer_addr, relay, ws_path).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient (e.g. out of file descriptors); keep serving.
                    error!("accept error: {e}");
                }
                Err(_) => {
                    // Idle; loop back to check the flag.
                }
            }
        }

        if relay.shutdown().is_err() {
            warn!("relay task already stopped");
        }
        relay_task.await.context("relay task panicked")?;
        Ok(())
    }
}

/// Binds and runs a relay server until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(config: RelayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    RelayServer::bind(config).await?.run(running).await
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_client(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    relay: RelayHandle,
    ws_path: Arc<str>,
) {
    match run_connection(raw_stream, peer_addr, relay, ws_path).await {
        Ok(()) => debug!("connection {peer_addr} closed"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    relay: RelayHandle,
    ws_path: Arc<str>,
) -> anyhow::Result<()> {
    let ws_stream = accept_hdr_async(raw_stream, |req: &Request, resp: Response| {
        check_upgrade_path(&ws_path, req, resp)
    })
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let id = ConnectionId::new();
    let (link, end) = ConnectionLink::pair(OUTBOUND_QUEUE_CAPACITY);
    let ConnectionEnd {
        outbound: mut out_rx,
        terminate,
    } = end;
    relay.connected(id, link)?;
    info!("connection {id} established from {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let writer = async {
        while let Some(out) = out_rx.recv().await {
            let frame = match out {
                Outbound::Text(text) => WsMessage::Text(text),
                Outbound::Probe => WsMessage::Ping(Vec::new()),
            };
            if let Err(e) = ws_tx.send(frame).await {
                debug!("connection {id}: send failed: {e}");
                break;
            }
        }
    };

    let reader = async {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => relay.text(id, text)?,
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => relay.text(id, text)?,
                    Err(_) => debug!("connection {id}: non-UTF-8 binary frame dropped"),
                },
                Ok(WsMessage::Pong(_)) => relay.probe_ack(id)?,
                Ok(WsMessage::Ping(_)) => {
                    // tokio-tungstenite queues the Pong reply itself.
                    debug!("connection {id}: ping from client");
                }
                Ok(WsMessage::Close(_)) => {
                    // Keep reading so the close reply gets flushed.
                    debug!("connection {id}: close frame received");
                }
                Ok(WsMessage::Frame(_)) => {}
                Err(WsError::ConnectionClosed | WsError::Protocol(_)) => break,
                Err(e) => {
                    warn!("connection {id}: WebSocket error: {e}");
                    break;
                }
            }
        }
        Ok::<(), RelayError>(())
    };

    // Whichever finishes first ends the connection; the rest are dropped with
    // it.  `terminate` also resolves if the relay drops the link.
    let outcome = tokio::select! {
        res = reader => res,
        () = writer => Ok(()),
        _ = terminate => {
            debug!("connection {id}: terminated by relay");
            Ok(())
        }
    };
    drop(ws_tx);
    drop(ws_rx);

    // Ignored if the relay already stopped or reaped this connection.
    let _ = relay.disconnected(id);
    info!("connection {id} from {peer_addr} closed");

    outcome.map_err(Into::into)
}

/// Handshake callback: only upgrade requests for `expected` are accepted.
fn check_upgrade_path(
    expected: &str,
    req: &Request,
    resp: Response,
) -> Result<Response, ErrorResponse> {
    let path = req.uri().path();
    if path == expected {
        return Ok(resp);
    }
    debug!("rejecting WebSocket upgrade for path {path}");
    let mut err = ErrorResponse::new(Some(format!("no WebSocket endpoint at {path}")));
    *err.status_mut() = StatusCode::NOT_FOUND;
    Err(err)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> Request {
        Request::builder().uri(uri).body(()).unwrap()
    }

    #[test]
    fn test_upgrade_on_configured_path_is_accepted() {
        let result = check_upgrade_path("/ws", &request("/ws"), Response::new(()));
        assert!(result.is_ok());
    }

    #[test]
    fn test_upgrade_with_query_string_is_accepted() {
        let result = check_upgrade_path("/ws", &request("/ws?token=abc"), Response::new(()));
        assert!(result.is_ok());
    }

    #[test]
    fn test_upgrade_on_other_path_is_rejected_with_404() {
        let err = check_upgrade_path("/ws", &request("/api/users"), Response::new(()))
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
