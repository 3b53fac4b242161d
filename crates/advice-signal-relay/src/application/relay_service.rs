//! The signaling relay: connection table, identity registry, routing and the
//! liveness sweep.
//!
//! [`SignalRelay`] is plain synchronous state.  Exactly one task owns it (see
//! `infrastructure::relay_task`), which gives the registry a single writer:
//! "look up recipient, check it is open, enqueue" can never interleave with a
//! deregistration.  Each connection is reached only through its
//! [`ConnectionLink`], so the relay never touches a socket.
//!
//! A link has two parts.  The bounded outbound queue carries frames in order.
//! The terminate signal is separate so a forced close never waits behind
//! frames a stalled peer is not reading.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::domain::liveness::{Liveness, ProbeDecision};
use crate::domain::messages::{ConnectionId, EnvelopeError, ErrorEnvelope, InboundEnvelope};

/// Frames buffered per connection before the recipient counts as unavailable.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 128;

/// Instruction for a connection's socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Send a WebSocket Ping.
    Probe,
}

/// Relay side of a connection: how the relay reaches its socket task.
#[derive(Debug)]
pub struct ConnectionLink {
    outbound: Sender<Outbound>,
    terminate: oneshot::Sender<()>,
}

/// Socket-task side of a connection.
///
/// `terminate` resolves when the relay forcibly closes the connection, or
/// when the relay drops the link (shutdown).
#[derive(Debug)]
pub struct ConnectionEnd {
    pub outbound: Receiver<Outbound>,
    pub terminate: oneshot::Receiver<()>,
}

impl ConnectionLink {
    /// Creates a linked pair with an outbound queue of `capacity` frames.
    pub fn pair(capacity: usize) -> (ConnectionLink, ConnectionEnd) {
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (term_tx, term_rx) = oneshot::channel();
        (
            ConnectionLink {
                outbound: out_tx,
                terminate: term_tx,
            },
            ConnectionEnd {
                outbound: out_rx,
                terminate: term_rx,
            },
        )
    }

    fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    fn close(self) {
        // The socket task may already be gone.
        let _ = self.terminate.send(());
    }
}

/// Result of handling one inbound text frame.
#[derive(Debug)]
pub enum Dispatch {
    /// The connection now owns `identity` in the registry.
    Registered { identity: String },
    /// The raw text was queued for the recipient.
    Forwarded {
        kind: String,
        from: String,
        to: String,
    },
    /// No open recipient with room in its queue; an error envelope went back
    /// to the sender.
    RecipientUnavailable {
        kind: String,
        from: String,
        to: String,
    },
    /// The frame was malformed and dropped.
    Dropped(EnvelopeError),
    /// The frame arrived for a connection the relay no longer tracks.
    UnknownConnection,
}

/// Outcome of one liveness sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub terminated: Vec<ConnectionId>,
}

/// Counts for status logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelaySnapshot {
    pub connections: usize,
    pub registered: usize,
}

#[derive(Debug)]
struct ConnectionEntry {
    link: ConnectionLink,
    identity: Option<String>,
    liveness: Liveness,
}

/// Process-local relay state.  Created empty; dropped with the relay task.
#[derive(Debug, Default)]
pub struct SignalRelay {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    registry: HashMap<String, ConnectionId>,
}

impl SignalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a freshly accepted connection as alive and unregistered.
    pub fn connect(&mut self, id: ConnectionId, link: ConnectionLink) {
        self.connections.insert(
            id,
            ConnectionEntry {
                link,
                identity: None,
                liveness: Liveness::Alive,
            },
        );
    }

    /// Handles one inbound text frame from connection `id`.
    ///
    /// `text` is forwarded verbatim when it is a routable signal.
    pub fn handle_text(&mut self, id: ConnectionId, text: &str) -> Dispatch {
        if !self.connections.contains_key(&id) {
            return Dispatch::UnknownConnection;
        }

        let envelope = match InboundEnvelope::parse(text) {
            Ok(env) => env,
            Err(e) => return Dispatch::Dropped(e),
        };

        match envelope {
            InboundEnvelope::Register { user_id } => {
                self.register(id, user_id.clone());
                Dispatch::Registered { identity: user_id }
            }
            InboundEnvelope::Signal { kind, from, to } => {
                if self.forward(&to, text) {
                    Dispatch::Forwarded { kind, from, to }
                } else {
                    self.reply_unavailable(id, from.clone());
                    Dispatch::RecipientUnavailable { kind, from, to }
                }
            }
        }
    }

    /// Records a Pong from connection `id`.
    pub fn probe_ack(&mut self, id: ConnectionId) {
        if let Some(entry) = self.connections.get_mut(&id) {
            entry.liveness.on_probe_ack();
        }
    }

    /// Forgets connection `id`; returns the identity it had registered.
    ///
    /// Safe to call for a connection already reaped by [`sweep`](Self::sweep).
    pub fn disconnect(&mut self, id: ConnectionId) -> Option<String> {
        let entry = self.connections.remove(&id)?;
        let identity = entry.identity?;
        self.release_identity(id, &identity);
        Some(identity)
    }

    /// Runs one liveness tick over every tracked connection.
    pub fn sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();

        for (id, entry) in self.connections.iter_mut() {
            match entry.liveness.on_tick() {
                ProbeDecision::SendProbe => {
                    // A full queue leaves the connection awaiting a response;
                    // a peer that far behind is reaped on the next tick.
                    if entry.link.outbound.try_send(Outbound::Probe).is_ok() {
                        report.probed += 1;
                    }
                }
                ProbeDecision::Terminate => report.terminated.push(*id),
            }
        }

        for id in &report.terminated {
            if let Some(entry) = self.connections.remove(id) {
                match &entry.identity {
                    Some(identity) => {
                        info!("connection {id} ({identity}) missed a probe; terminating");
                        self.release_identity(*id, identity);
                    }
                    None => info!("connection {id} missed a probe; terminating"),
                }
                entry.link.close();
            }
        }

        report
    }

    /// Terminates every connection and empties the registry.
    pub fn shutdown(&mut self) {
        for (_, entry) in self.connections.drain() {
            entry.link.close();
        }
        self.registry.clear();
    }

    pub fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            connections: self.connections.len(),
            registered: self.registry.len(),
        }
    }

    /// Connection currently registered under `identity`, if any.
    pub(crate) fn registered_connection(&self, identity: &str) -> Option<ConnectionId> {
        self.registry.get(identity).copied()
    }

    fn register(&mut self, id: ConnectionId, identity: String) {
        let previous_identity = match self.connections.get_mut(&id) {
            Some(entry) => entry.identity.replace(identity.clone()),
            None => return,
        };

        // A connection that re-registers under a new name gives up the old one.
        if let Some(old) = previous_identity.filter(|old| *old != identity) {
            self.release_identity(id, &old);
        }

        if let Some(superseded) = self.registry.insert(identity.clone(), id) {
            if superseded != id {
                // The superseded connection stays open and keeps its identity
                // field; it just stops receiving signals for that name.
                warn!("identity {identity} moved from connection {superseded} to {id}");
                return;
            }
        }
        info!("connection {id} registered as {identity}");
    }

    /// Removes `identity` from the registry only if it still points at `id`.
    fn release_identity(&mut self, id: ConnectionId, identity: &str) {
        if self.registry.get(identity) == Some(&id) {
            self.registry.remove(identity);
        }
    }

    fn forward(&self, to: &str, text: &str) -> bool {
        let Some(recipient) = self.registry.get(to) else {
            return false;
        };
        let Some(entry) = self.connections.get(recipient) else {
            return false;
        };
        if !entry.link.is_open() {
            return false;
        }
        match entry.link.outbound.try_send(Outbound::Text(text.to_string())) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("connection {recipient} ({to}): outbound queue full");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn reply_unavailable(&self, id: ConnectionId, sender: String) {
        let Some(entry) = self.connections.get(&id) else {
            return;
        };
        match ErrorEnvelope::recipient_not_available(sender).to_json() {
            Ok(json) => {
                if let Err(TrySendError::Full(_)) =
                    entry.link.outbound.try_send(Outbound::Text(json))
                {
                    warn!("connection {id}: outbound queue full; error reply dropped");
                }
            }
            Err(e) => error!("connection {id}: failed to encode error envelope: {e}"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
