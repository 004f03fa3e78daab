use async_trait::async_trait;
use relay_core::{Delivery, DeviceId, HubError};
use tokio_util::sync::CancellationToken;

use crate::registry::{Registry, SessionReceiver, SessionSender};

/// Capability set the transport layer consumes.
///
/// [`Registry`] is the one real implementation; the trait keeps the boundary
/// substitutable for tests and future backends.
#[async_trait]
pub trait DeviceHub: Send + Sync {
    fn register(&self, id: DeviceId) -> Result<SessionReceiver, HubError>;
    fn get(&self, id: DeviceId) -> Result<SessionSender, HubError>;
    fn close(&self, id: DeviceId) -> Result<(), HubError>;
    async fn send_to(
        &self,
        id: DeviceId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Delivery, HubError>;
    async fn send_to_all(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Delivery, HubError>;
}

#[async_trait]
impl DeviceHub for Registry {
    fn register(&self, id: DeviceId) -> Result<SessionReceiver, HubError> {
        Registry::register(self, id)
    }

    fn get(&self, id: DeviceId) -> Result<SessionSender, HubError> {
        Registry::get(self, id)
    }

    fn close(&self, id: DeviceId) -> Result<(), HubError> {
        Registry::close(self, id)
    }

    async fn send_to(
        &self,
        id: DeviceId,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Delivery, HubError> {
        Registry::send_to(self, id, text, cancel).await
    }

    async fn send_to_all(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Delivery, HubError> {
        Registry::send_to_all(self, text, cancel).await
    }
}
