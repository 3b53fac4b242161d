//! Messages from connection tasks to the relay task.
//!
//! Connection tasks never touch [`SignalRelay`](super::SignalRelay) directly;
//! they hold a cloneable [`RelayHandle`] and post [`RelayCommand`]s in the
//! order events happen on their socket.  One unbounded queue feeds the relay
//! task, so commands from a single connection are applied in FIFO order.

use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::application::relay_service::ConnectionLink;
use crate::domain::messages::ConnectionId;

/// Errors surfaced to connection tasks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The relay task has exited (server shutting down).
    #[error("relay task is no longer running")]
    RelayStopped,
}

/// One event for the relay task to apply.
#[derive(Debug)]
pub enum RelayCommand {
    Connected {
        id: ConnectionId,
        link: ConnectionLink,
    },
    Text {
        id: ConnectionId,
        text: String,
    },
    ProbeAck {
        id: ConnectionId,
    },
    Disconnected {
        id: ConnectionId,
    },
    /// Terminate all connections and stop the relay task.
    Shutdown,
}

/// Cloneable sender side of the relay command queue.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: UnboundedSender<RelayCommand>,
}

impl RelayHandle {
    /// Creates a handle and the receiver the relay task will drain.
    pub fn channel() -> (Self, UnboundedReceiver<RelayCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn connected(&self, id: ConnectionId, link: ConnectionLink) -> Result<(), RelayError> {
        self.send(RelayCommand::Connected { id, link })
    }

    pub fn text(&self, id: ConnectionId, text: String) -> Result<(), RelayError> {
        self.send(RelayCommand::Text { id, text })
    }

    pub fn probe_ack(&self, id: ConnectionId) -> Result<(), RelayError> {
        self.send(RelayCommand::ProbeAck { id })
    }

    pub fn disconnected(&self, id: ConnectionId) -> Result<(), RelayError> {
        self.send(RelayCommand::Disconnected { id })
    }

    pub fn shutdown(&self) -> Result<(), RelayError> {
        self.send(RelayCommand::Shutdown)
    }

    fn send(&self, cmd: RelayCommand) -> Result<(), RelayError> {
        self.tx.send(cmd).map_err(|_| RelayError::RelayStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_order() {
        let (handle, mut rx) = RelayHandle::channel();
        let id = ConnectionId::new();
        handle.text(id, "one".into()).unwrap();
        handle.probe_ack(id).unwrap();
        handle.disconnected(id).unwrap();

        assert!(matches!(rx.try_recv(), Ok(RelayCommand::Text { text, .. }) if text == "one"));
        assert!(matches!(rx.try_recv(), Ok(RelayCommand::ProbeAck { .. })));
        assert!(matches!(rx.try_recv(), Ok(RelayCommand::Disconnected { .. })));
    }

    #[test]
    fn test_send_after_relay_stopped_is_an_error() {
        let (handle, rx) = RelayHandle::channel();
        drop(rx);
        assert_eq!(handle.shutdown(), Err(RelayError::RelayStopped));
    }
}
