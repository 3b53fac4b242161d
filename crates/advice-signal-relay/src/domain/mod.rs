//! Domain layer for advice-signal-relay.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or async runtimes.
//!
//! # What belongs in the domain layer?
//!
//! - The signaling envelope "language" spoken by clients
//! - The per-connection liveness state machine
//! - Configuration structures
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - Environment variable reading

pub mod config;
pub mod liveness;
pub mod messages;

pub use config::RelayConfig;
pub use liveness::{Liveness, ProbeDecision};
pub use messages::{ConnectionId, EnvelopeError, ErrorEnvelope, InboundEnvelope};
