//! advice-signal-relay library crate.
//!
//! This crate provides the WebSocket signaling relay used by the advice
//! marketplace for peer-to-peer calls between users and experts.  Clients
//! register an identity and exchange opaque signaling envelopes (offer,
//! answer, ICE candidates) through the relay.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Client (JSON over WebSocket, path /ws)
//!         ↕
//! [advice-signal-relay]
//!   ├── domain/           Pure types: envelopes, liveness state, RelayConfig
//!   ├── application/      SignalRelay: registry, routing, liveness sweep
//!   └── infrastructure/
//!         ├── relay_task/ Single-writer task owning the SignalRelay + probe timer
//!         └── ws_server/  WebSocket accept loop and per-connection tasks
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and tokio's mpsc senders only; every
//!   operation is synchronous so it can be driven directly from tests.
//! - `infrastructure` owns sockets, tasks and timers.

/// Domain layer: envelope parsing, liveness state machine, configuration.
pub mod domain;

/// Application layer: the signaling relay state and its operations.
pub mod application;

/// Infrastructure layer: relay task and WebSocket server.
pub mod infrastructure;
