//! Per-connection pump bridging a duplex transport to a device session.
//!
//! One pump runs for each live connection: a spawned reader task forwards
//! inbound frames onto a local channel, and the pump loop selects over that
//! channel, the session's outbound channel, and cancellation until one of
//! them ends the connection.

use std::sync::Arc;

use relay_core::{DeviceId, HubError, MessageTransport, TransportRead, TransportWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::hub::DeviceHub;

/// Drive one connection until it disconnects.
///
/// Parses `raw_id`, registers the device, then pumps frames both ways. On a
/// parse failure or a duplicate registration the connection is rejected with
/// one diagnostic frame. The transport is closed on every exit path, and a
/// reader error never closes it directly — only this function does, once.
pub async fn run_pump<T: MessageTransport>(
    transport: T,
    raw_id: &str,
    registry: Arc<dyn DeviceHub>,
    shutdown: CancellationToken,
    inbound_buffer: usize,
) {
    let (mut read, mut write) = transport.split();

    let id: DeviceId = match raw_id.parse() {
        Ok(id) => id,
        Err(err) => {
            reject(&mut write, &err).await;
            return;
        }
    };

    let mut session = match registry.register(id) {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(device_id = %id, "rejected duplicate connection");
            reject(&mut write, &err).await;
            return;
        }
    };
    tracing::info!(device_id = %id, "device connected");

    let (inbound_tx, mut inbound) = mpsc::channel::<String>(inbound_buffer);
    let reader = tokio::spawn(async move {
        loop {
            match read.read().await {
                Ok(Some(frame)) => {
                    if inbound_tx.send(frame).await.is_err() {
                        break; // pump exited
                    }
                }
                // normal closure: dropping the sender closes the inbound
                // channel, which the pump loop treats as orderly shutdown
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(device_id = %id, error = %err, "transport read failed");
                    break;
                }
            }
        }
    });

    let stop = session.stop().clone();

    loop {
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(frame) => {
                    tracing::info!(device_id = %id, message = %frame, "received message from device");
                }
                None => {
                    // reader is done (orderly close or read error); the
                    // session must not outlive the connection
                    if let Err(err) = registry.close(id) {
                        tracing::debug!(device_id = %id, error = %err, "session already closed");
                    }
                    break;
                }
            },
            msg = session.recv() => match msg {
                Some(text) => {
                    if let Err(err) = write.write(&text).await {
                        tracing::error!(device_id = %id, error = %err, "transport write failed");
                        if let Err(err) = registry.close(id) {
                            tracing::debug!(device_id = %id, error = %err, "session already closed");
                        }
                        break;
                    }
                }
                // registry entry gone with no stop signal observed yet
                None => break,
            },
            _ = stop.cancelled() => break,
            _ = shutdown.cancelled() => break,
        }
    }

    reader.abort();
    write.close().await;
    tracing::info!(device_id = %id, "device disconnected");
}

/// Write one diagnostic frame and close. Used for connection attempts that
/// never reach the Active state.
async fn reject<W: TransportWrite>(write: &mut W, err: &HubError) {
    if let Err(write_err) = write.write(&err.to_string()).await {
        tracing::error!(error = %write_err, "failed to write rejection frame");
    }
    write.close().await;
}
