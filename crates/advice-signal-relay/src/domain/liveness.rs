//! Per-connection liveness state machine.
//!
//! ```text
//!            probe sent
//!   Alive ───────────────▶ AwaitingProbeResponse
//!     ▲                          │        │
//!     └──────── probe ack ───────┘        │ next tick
//!                                         ▼
//!                                     terminate
//! ```
//!
//! Connections start [`Liveness::Alive`].  The relay's sweep calls
//! [`Liveness::on_tick`] once per interval and acts on the returned
//! [`ProbeDecision`]; a Pong calls [`Liveness::on_probe_ack`].

/// Liveness of one connection as seen by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Liveness {
    /// The peer answered the last probe (or has not been probed yet).
    #[default]
    Alive,
    /// A probe was sent on the previous tick and no ack has arrived.
    AwaitingProbeResponse,
}

/// What the sweep must do with a connection on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeDecision {
    /// Send a Ping; the state is now [`Liveness::AwaitingProbeResponse`].
    SendProbe,
    /// The previous probe went unanswered; close the connection.
    Terminate,
}

impl Liveness {
    /// Advances the state for a timer tick.
    ///
    /// The state flips to awaiting *before* the caller sends the probe, so an
    /// ack racing the send can never be lost.
    pub fn on_tick(&mut self) -> ProbeDecision {
        match self {
            Liveness::Alive => {
                *self = Liveness::AwaitingProbeResponse;
                ProbeDecision::SendProbe
            }
            Liveness::AwaitingProbeResponse => ProbeDecision::Terminate,
        }
    }

    /// Records a probe acknowledgment (WebSocket Pong).
    pub fn on_probe_ack(&mut self) {
        *self = Liveness::Alive;
    }

    pub fn is_alive(self) -> bool {
        self == Liveness::Alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_starts_alive() {
        assert_eq!(Liveness::default(), Liveness::Alive);
    }

    #[test]
    fn test_first_tick_sends_ping_and_awaits() {
        let mut l = Liveness::Alive;
        assert_eq!(l.on_tick(), ProbeDecision::SendProbe);
        assert_eq!(l, Liveness::AwaitingProbeResponse);
    }

    #[test]
    fn test_unanswered_ping_terminates_on_next_tick() {
        let mut l = Liveness::Alive;
        l.on_tick();
        assert_eq!(l.on_tick(), ProbeDecision::Terminate);
    }

    #[test]
    fn test_ack_between_ticks_keeps_connection() {
        let mut l = Liveness::Alive;
        for _ in 0..10 {
            assert_eq!(l.on_tick(), ProbeDecision::SendProbe);
            l.on_probe_ack();
            assert!(l.is_alive());
        }
    }

    #[test]
    fn test_unsolicited_ack_is_harmless() {
        let mut l = Liveness::Alive;
        l.on_probe_ack();
        assert!(l.is_alive());
    }
}
