//! Fan-out of outbound messages to one or all connected devices.
//!
//! Exposed as methods on [`Registry`] since it is the hub's primary
//! write-path API, but the delivery logic itself never mutates a session:
//! it only writes the outbound channel and reads the stop signal.

use relay_core::{Delivery, DeviceId, HubError};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::registry::{Outbound, Registry, SessionSender};

/// Per-session result of one dispatched send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SendOutcome {
    Delivered,
    /// Caller-side cancellation fired first. Success-adjacent: the hub did
    /// nothing wrong, the caller stopped waiting.
    Cancelled,
    /// The device disconnected before taking the message.
    Gone,
}

/// Offer `text` to one session exactly once, racing the rendezvous against
/// the session's stop signal and the caller's cancellation.
///
/// Once the message is accepted into the slot, a cancellation that fires
/// before the ack still reports `Cancelled` even though the pump may go on
/// to consume and write the frame. The outcome says the caller stopped
/// waiting, not that delivery was prevented.
async fn send_one(session: &SessionSender, text: &str, cancel: &CancellationToken) -> SendOutcome {
    let (ack_tx, ack_rx) = oneshot::channel();
    let msg = Outbound {
        text: text.to_owned(),
        ack: ack_tx,
    };

    tokio::select! {
        res = session.outbound.send(msg) => {
            if res.is_err() {
                return SendOutcome::Gone;
            }
        }
        _ = session.stop.cancelled() => return SendOutcome::Gone,
        _ = cancel.cancelled() => return SendOutcome::Cancelled,
    }

    // The message is in the slot; the rendezvous completes when the pump
    // acks it. A stop before the ack means it was never consumed.
    tokio::select! {
        res = ack_rx => match res {
            Ok(()) => SendOutcome::Delivered,
            Err(_) => SendOutcome::Gone,
        },
        _ = session.stop.cancelled() => SendOutcome::Gone,
        _ = cancel.cancelled() => SendOutcome::Cancelled,
    }
}

impl Registry {
    /// Deliver `text` to a single device.
    ///
    /// `NotFound` if the device is absent or disconnects before consuming
    /// the message. A caller-side cancellation is reported as
    /// `Ok(Delivery::Cancelled)`, not as an error.
    pub async fn send_to(
        &self,
        id: DeviceId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Delivery, HubError> {
        let session = self.get(id)?;
        match send_one(&session, text, cancel).await {
            SendOutcome::Delivered => Ok(Delivery::Delivered),
            SendOutcome::Cancelled => Ok(Delivery::Cancelled),
            SendOutcome::Gone => Err(HubError::NotFound(id)),
        }
    }

    /// Deliver `text` to every device in one snapshot of the table.
    ///
    /// One task per snapshotted session; the registry lock is released
    /// before any send starts, so a blocked send never stalls the table.
    /// The call fails only if every send failed — partial failure is
    /// reported as success, and devices registered after the snapshot are
    /// not included.
    pub async fn send_to_all(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Delivery, HubError> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Ok(Delivery::Delivered);
        }

        let attempted = snapshot.len();
        let mut tasks = Vec::with_capacity(attempted);
        for (id, session) in snapshot {
            let text = text.to_owned();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = send_one(&session, &text, &cancel).await;
                if outcome == SendOutcome::Gone {
                    tracing::debug!(device_id = %id, "device disconnected mid-broadcast");
                }
                outcome
            }));
        }

        // Each task owns its slot in the result vector; no shared error
        // variable to race on.
        let outcomes = futures::future::join_all(tasks).await;
        let failed = outcomes
            .iter()
            .filter(|res| !matches!(res, Ok(SendOutcome::Delivered | SendOutcome::Cancelled)))
            .count();

        if failed == attempted {
            return Err(HubError::AllFailed { attempted });
        }
        Ok(Delivery::Delivered)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn device() -> DeviceId {
        DeviceId::new()
    }

    /// Consume every outbound message for a session in the background.
    fn spawn_consumer(mut rx: crate::registry::SessionReceiver) -> tokio::task::JoinHandle<Vec<String>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(text) = rx.recv().await {
                seen.push(text);
            }
            seen
        })
    }

    #[tokio::test]
    async fn send_to_unknown_device_is_not_found() {
        let registry = Registry::new();
        let cancel = CancellationToken::new();

        let err = registry.send_to(device(), "hi", &cancel).await.unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
    }

    #[tokio::test]
    async fn send_to_delivers_to_consuming_pump() {
        let registry = Registry::new();
        let id = device();
        let mut rx = registry.register(id).unwrap();
        let cancel = CancellationToken::new();

        let consumer = tokio::spawn(async move { rx.recv().await });

        let delivery = registry.send_to(id, "hello", &cancel).await.unwrap();
        assert_eq!(delivery, Delivery::Delivered);
        assert_eq!(consumer.await.unwrap(), Some("hello".to_owned()));
    }

    #[tokio::test]
    async fn send_blocks_until_consumed() {
        let registry = Arc::new(Registry::new());
        let id = device();
        let mut rx = registry.register(id).unwrap();
        let cancel = CancellationToken::new();

        let sender = {
            let registry = Arc::clone(&registry);
            let cancel = cancel.clone();
            tokio::spawn(async move { registry.send_to(id, "slow", &cancel).await })
        };

        // nobody has consumed yet; the rendezvous must still be pending
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sender.is_finished());

        assert_eq!(rx.recv().await, Some("slow".to_owned()));
        assert_eq!(sender.await.unwrap().unwrap(), Delivery::Delivered);
    }

    #[tokio::test]
    async fn send_to_closed_mid_flight_is_not_found() {
        let registry = Arc::new(Registry::new());
        let id = device();
        let _rx = registry.register(id).unwrap();
        let cancel = CancellationToken::new();

        let sender = {
            let registry = Arc::clone(&registry);
            let cancel = cancel.clone();
            tokio::spawn(async move { registry.send_to(id, "doomed", &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.close(id).unwrap();

        let err = sender.await.unwrap().unwrap_err();
        assert_eq!(err, HubError::NotFound(id));
    }

    #[tokio::test]
    async fn cancelled_send_is_not_an_error() {
        let registry = Registry::new();
        let id = device();
        let _rx = registry.register(id).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let delivery = registry.send_to(id, "late", &cancel).await.unwrap();
        assert_eq!(delivery, Delivery::Cancelled);
    }

    #[tokio::test]
    async fn broadcast_to_empty_registry_is_ok() {
        let registry = Registry::new();
        let cancel = CancellationToken::new();
        assert!(registry.send_to_all("anyone?", &cancel).await.is_ok());
    }

    #[tokio::test]
    async fn broadcast_partial_failure_reports_success() {
        let registry = Arc::new(Registry::new());
        let live_a = device();
        let live_b = device();
        let gone = device();

        let consumer_a = spawn_consumer(registry.register(live_a).unwrap());
        let consumer_b = spawn_consumer(registry.register(live_b).unwrap());

        // the third device never consumes and disconnects while the
        // broadcast is in flight
        let _gone_rx = registry.register(gone).unwrap();
        let closer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                registry.close(gone).unwrap();
            })
        };

        let cancel = CancellationToken::new();
        let delivery = registry.send_to_all("fanout", &cancel).await.unwrap();
        assert_eq!(delivery, Delivery::Delivered);
        closer.await.unwrap();

        registry.close_all();
        assert_eq!(consumer_a.await.unwrap(), vec!["fanout".to_owned()]);
        assert_eq!(consumer_b.await.unwrap(), vec!["fanout".to_owned()]);
    }

    #[tokio::test]
    async fn broadcast_fails_only_when_every_send_fails() {
        let registry = Arc::new(Registry::new());
        let first = device();
        let second = device();
        let _rx1 = registry.register(first).unwrap();
        let _rx2 = registry.register(second).unwrap();

        // nobody consumes; close both once the sends are parked
        let closer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                registry.close(first).unwrap();
                registry.close(second).unwrap();
            })
        };

        let cancel = CancellationToken::new();
        let err = registry.send_to_all("void", &cancel).await.unwrap_err();
        assert_eq!(err, HubError::AllFailed { attempted: 2 });
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_sends_do_not_fail_a_broadcast() {
        let registry = Registry::new();
        let _rx1 = registry.register(device()).unwrap();
        let _rx2 = registry.register(device()).unwrap();

        let cancel = CancellationToken::new();
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                cancel.cancel();
            })
        };

        // no consumers, but a caller timeout is not a delivery failure
        let delivery = registry.send_to_all("besteffort", &cancel).await.unwrap();
        assert_eq!(delivery, Delivery::Delivered);
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn device_registered_after_snapshot_is_not_included() {
        let registry = Arc::new(Registry::new());
        let early = device();
        let consumer = spawn_consumer(registry.register(early).unwrap());

        let cancel = CancellationToken::new();
        registry.send_to_all("first", &cancel).await.unwrap();

        // a device joining now must not retroactively receive "first"
        let late = device();
        let late_consumer = spawn_consumer(registry.register(late).unwrap());

        registry.close_all();
        assert_eq!(consumer.await.unwrap(), vec!["first".to_owned()]);
        assert!(late_consumer.await.unwrap().is_empty());
    }
}
