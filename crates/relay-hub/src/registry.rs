use std::collections::hash_map::Entry;
use std::collections::HashMap;

use parking_lot::RwLock;
use relay_core::{DeviceId, HubError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// One outbound frame in flight.
///
/// The channel has capacity 1 and the receiver acks on take, which makes the
/// handoff a rendezvous: a send call completes only once the pump has
/// actually consumed the message, so a slow device backpressures its senders
/// instead of queuing unboundedly.
pub(crate) struct Outbound {
    pub(crate) text: String,
    pub(crate) ack: oneshot::Sender<()>,
}

struct Session {
    outbound: mpsc::Sender<Outbound>,
    stop: CancellationToken,
}

/// Dispatcher-side handle to one session's channels.
#[derive(Clone)]
pub struct SessionSender {
    pub(crate) outbound: mpsc::Sender<Outbound>,
    pub(crate) stop: CancellationToken,
}

/// Pump-side handle returned by [`Registry::register`].
///
/// Owns the receive end of the session's outbound channel. Dropping it (or
/// the pump exiting) makes any in-flight send observe the session as gone.
#[derive(Debug)]
pub struct SessionReceiver {
    outbound: mpsc::Receiver<Outbound>,
    stop: CancellationToken,
}

impl SessionReceiver {
    /// Take the next outbound message, completing the sender's rendezvous.
    ///
    /// Returns `None` once the registry entry is gone and no send is in
    /// flight.
    pub async fn recv(&mut self) -> Option<String> {
        let msg = self.outbound.recv().await?;
        let _ = msg.ack.send(());
        Some(msg.text)
    }

    /// Signal cancelled by the registry when this session is closed.
    pub fn stop(&self) -> &CancellationToken {
        &self.stop
    }
}

/// Process-wide table of live device sessions.
///
/// A single reader/writer lock protects the table: `register`/`close` take it
/// exclusively, lookups and broadcast snapshots take it shared. The lock is
/// only ever held for map operations, never across an `.await`.
///
/// One instance is created at service start and handed to the transport layer
/// and dispatcher; `close_all` tears it down at service stop.
#[derive(Default)]
pub struct Registry {
    sessions: RwLock<HashMap<DeviceId, Session>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `id` with fresh channels.
    ///
    /// Check-and-insert happens atomically under the exclusive lock. A
    /// duplicate id fails with `AlreadyRegistered` and leaves the existing
    /// session untouched; the caller is expected to reject the new
    /// connection, not retry.
    pub fn register(&self, id: DeviceId) -> Result<SessionReceiver, HubError> {
        let mut sessions = self.sessions.write();
        match sessions.entry(id) {
            Entry::Occupied(_) => Err(HubError::AlreadyRegistered(id)),
            Entry::Vacant(entry) => {
                let (tx, rx) = mpsc::channel(1);
                let stop = CancellationToken::new();
                entry.insert(Session {
                    outbound: tx,
                    stop: stop.clone(),
                });
                Ok(SessionReceiver { outbound: rx, stop })
            }
        }
    }

    /// Look up the send handle for `id`. Never blocks.
    pub fn get(&self, id: DeviceId) -> Result<SessionSender, HubError> {
        let sessions = self.sessions.read();
        sessions
            .get(&id)
            .map(|s| SessionSender {
                outbound: s.outbound.clone(),
                stop: s.stop.clone(),
            })
            .ok_or(HubError::NotFound(id))
    }

    /// Remove the session for `id`, signalling any in-flight send that the
    /// device is gone. After this returns the id is free to reconnect.
    pub fn close(&self, id: DeviceId) -> Result<(), HubError> {
        let mut sessions = self.sessions.write();
        let session = sessions.remove(&id).ok_or(HubError::NotFound(id))?;
        session.stop.cancel();
        Ok(())
    }

    /// Snapshot of all current sessions for a broadcast.
    ///
    /// Taken under one shared-lock read and released before any send starts;
    /// devices registered afterwards are not part of that broadcast.
    pub(crate) fn snapshot(&self) -> Vec<(DeviceId, SessionSender)> {
        let sessions = self.sessions.read();
        sessions
            .iter()
            .map(|(id, s)| {
                (
                    *id,
                    SessionSender {
                        outbound: s.outbound.clone(),
                        stop: s.stop.clone(),
                    },
                )
            })
            .collect()
    }

    /// Forcibly close every session. Called at service stop.
    pub fn close_all(&self) -> usize {
        let mut sessions = self.sessions.write();
        let count = sessions.len();
        for (id, session) in sessions.drain() {
            session.stop.cancel();
            tracing::debug!(device_id = %id, "session closed at shutdown");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
