//! The relay task: sole owner of [`SignalRelay`] and the liveness timer.
//!
//! All registry mutation happens on this one task.  It waits on two event
//! sources with `tokio::select!`:
//!
//! - the command queue fed by connection tasks, and
//! - the probe interval timer, which triggers a liveness sweep.
//!
//! The task exits on [`RelayCommand::Shutdown`] or once every
//! [`RelayHandle`] has been dropped.  Either way it terminates the remaining
//! connections, and the timer is dropped with the task.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::application::{Dispatch, RelayCommand, RelayHandle, SignalRelay};
use crate::domain::messages::ConnectionId;

/// Spawns a relay task with an empty registry.
///
/// Returns the handle connection tasks use to reach it and the task's
/// `JoinHandle` so the server can await a clean stop.
pub fn spawn_relay(probe_interval: Duration) -> (RelayHandle, JoinHandle<()>) {
    let (handle, rx) = RelayHandle::channel();
    let task = tokio::spawn(run_relay(SignalRelay::new(), rx, probe_interval));
    (handle, task)
}

/// Drives `relay` until shutdown.
pub async fn run_relay(
    mut relay: SignalRelay,
    mut commands: UnboundedReceiver<RelayCommand>,
    probe_interval: Duration,
) {
    // First sweep one full interval after start, not immediately.
    let mut ticker = interval_at(Instant::now() + probe_interval, probe_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("relay started (probe interval {probe_interval:?})");

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(RelayCommand::Shutdown) => {
                    info!("relay shutdown requested");
                    break;
                }
                Some(cmd) => apply(&mut relay, cmd),
                None => {
                    debug!("all relay handles dropped");
                    break;
                }
            },
            _ = ticker.tick() => {
                let report = relay.sweep();
                let snapshot = relay.snapshot();
                debug!(
                    "liveness sweep: probed={} terminated={} connections={} registered={}",
                    report.probed,
                    report.terminated.len(),
                    snapshot.connections,
                    snapshot.registered
                );
            }
        }
    }

    relay.shutdown();
    info!("relay stopped");
}

fn apply(relay: &mut SignalRelay, cmd: RelayCommand) {
    match cmd {
        RelayCommand::Connected { id, link } => {
            relay.connect(id, link);
            debug!("connection {id} tracked");
        }
        RelayCommand::Text { id, text } => log_dispatch(id, relay.handle_text(id, &text)),
        RelayCommand::ProbeAck { id } => relay.probe_ack(id),
        RelayCommand::Disconnected { id } => {
            if let Some(identity) = relay.disconnect(id) {
                info!("connection {id} ({identity}) disconnected");
            }
        }
        // Handled by the loop.
        RelayCommand::Shutdown => {}
    }
}

fn log_dispatch(id: ConnectionId, dispatch: Dispatch) {
    match dispatch {
        // Logged at info by the relay itself.
        Dispatch::Registered { .. } => {}
        Dispatch::Forwarded { kind, from, to } => {
            debug!("connection {id}: {kind} {from} → {to}");
        }
        Dispatch::RecipientUnavailable { kind, from, to } => {
            debug!("connection {id}: {kind} {from} → {to}: recipient not available");
        }
        Dispatch::Dropped(e) => debug!("connection {id}: dropping frame: {e}"),
        Dispatch::UnknownConnection => debug!("connection {id}: frame after disconnect ignored"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{ConnectionLink, Outbound, OUTBOUND_QUEUE_CAPACITY};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn link() -> (ConnectionLink, crate::application::ConnectionEnd) {
        ConnectionLink::pair(OUTBOUND_QUEUE_CAPACITY)
    }

    #[tokio::test]
    async fn test_silent_connection_is_pinged_then_terminated() {
        let (relay, task) = spawn_relay(Duration::from_millis(20));
        let id = ConnectionId::new();
        let (link, mut end) = link();
        relay.connected(id, link).unwrap();

        assert_eq!(
            timeout(WAIT, end.outbound.recv()).await.unwrap(),
            Some(Outbound::Probe)
        );
        assert!(timeout(WAIT, &mut end.terminate).await.unwrap().is_ok());

        relay.shutdown().unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_acked_connection_keeps_getting_pings() {
        let (relay, task) = spawn_relay(Duration::from_millis(20));
        let id = ConnectionId::new();
        let (link, mut end) = link();
        relay.connected(id, link).unwrap();

        for _ in 0..5 {
            let msg = timeout(WAIT, end.outbound.recv()).await.unwrap();
            assert_eq!(msg, Some(Outbound::Probe));
            relay.probe_ack(id).unwrap();
        }

        relay.shutdown().unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_terminates_connections_and_stops_task() {
        let (relay, task) = spawn_relay(Duration::from_secs(30));
        let (link, mut end) = link();
        relay.connected(ConnectionId::new(), link).unwrap();
        relay.shutdown().unwrap();

        timeout(WAIT, task).await.unwrap().unwrap();
        assert!((&mut end.terminate).await.is_ok());
        // Queue is closed once the relay is gone.
        assert_eq!(end.outbound.recv().await, None);
        assert!(relay.probe_ack(ConnectionId::new()).is_err());
    }

    #[tokio::test]
    async fn test_routes_between_connections() {
        let (relay, task) = spawn_relay(Duration::from_secs(30));
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        let (a_link, mut a_end) = link();
        let (b_link, _b_end) = link();
        relay.connected(a, a_link).unwrap();
        relay.connected(b, b_link).unwrap();
        relay
            .text(a, r#"{"type":"register","userId":"alice"}"#.into())
            .unwrap();

        let offer = r#"{"type":"offer","from":"bob","to":"alice","sdp":"x"}"#;
        relay.text(b, offer.into()).unwrap();

        assert_eq!(
            timeout(WAIT, a_end.outbound.recv()).await.unwrap(),
            Some(Outbound::Text(offer.to_string()))
        );

        relay.shutdown().unwrap();
        timeout(WAIT, task).await.unwrap().unwrap();
    }
}
