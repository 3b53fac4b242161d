//! Application layer for advice-signal-relay.
//!
//! Knows *what* the relay does with each event (register, route, probe,
//! reap) but not *how* events arrive.  Everything here is synchronous.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or accepting connections
//! - Timers and task spawning
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod commands;
pub mod relay_service;

pub use commands::{RelayCommand, RelayError, RelayHandle};
pub use relay_service::{
    ConnectionEnd, ConnectionLink, Dispatch, Outbound, RelaySnapshot, SignalRelay, SweepReport,
    OUTBOUND_QUEUE_CAPACITY,
};
