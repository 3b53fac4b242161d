//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is populated from CLI arguments in `main.rs` or from defaults in tests.

use std::net::SocketAddr;
use std::time::Duration;

/// All runtime configuration for the signaling relay.
///
/// # Example
///
/// ```rust
/// use advice_signal_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.ws_path, "/ws");
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The address and port the WebSocket server binds to.
    pub bind_addr: SocketAddr,

    /// Request path clients must use for the WebSocket upgrade.
    ///
    /// Upgrade requests for any other path are rejected with `404 Not Found`.
    pub ws_path: String,

    /// Period of the liveness sweep.
    ///
    /// Every tick each connection either receives a WebSocket Ping or, if it
    /// did not answer the previous one, is terminated.  A silent peer is
    /// therefore reaped within two intervals.
    pub probe_interval: Duration,
}

impl Default for RelayConfig {
    /// | Field           | Default        |
    /// |-----------------|----------------|
    /// | bind_addr       | `0.0.0.0:5000` |
    /// | ws_path         | `/ws`          |
    /// | probe_interval  | 30 seconds     |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            ws_path: "/ws".to_string(),
            probe_interval: Duration::from_secs(30),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_5000() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.bind_addr.port(), 5000);
    }

    #[test]
    fn test_default_bind_ip_is_unspecified() {
        let cfg = RelayConfig::default();
        assert!(cfg.bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_ws_path() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.ws_path, "/ws");
    }

    #[test]
    fn test_default_ping_interval_is_30s() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.probe_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_config_custom_values() {
        let cfg = RelayConfig {
            bind_addr: "127.0.0.1:9000".parse().unwrap(),
            ws_path: "/signal".to_string(),
            probe_interval: Duration::from_millis(250),
        };
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.ws_path, "/signal");
        assert_eq!(cfg.probe_interval, Duration::from_millis(250));
    }
}
