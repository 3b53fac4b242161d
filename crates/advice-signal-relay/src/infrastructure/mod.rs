//! Infrastructure layer for advice-signal-relay.
//!
//! Handles all I/O and scheduling:
//!
//! - Binding the TCP listener and performing the WebSocket upgrade
//! - Spawning one Tokio task per connection
//! - Running the single relay task and its liveness timer
//! - Stopping everything when the shutdown flag is cleared

pub mod relay_task;
pub mod ws_server;

pub use relay_task::spawn_relay;
pub use ws_server::{run_server, RelayServer};
