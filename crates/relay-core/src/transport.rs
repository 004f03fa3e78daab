use async_trait::async_trait;

/// Failure while reading from or writing to a duplex transport.
///
/// Transport errors are logged and terminate the affected connection's pump;
/// they never propagate to other sessions.
#[derive(Clone, Debug, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// A duplex text-frame transport as the pump sees it.
///
/// The server crate implements this over an upgraded axum WebSocket; tests
/// implement it over in-memory channels. The pump splits the transport so
/// the reader loop and the write side can run as separate tasks.
pub trait MessageTransport: Send + 'static {
    type Read: TransportRead;
    type Write: TransportWrite;

    fn split(self) -> (Self::Read, Self::Write);
}

/// Read half of a transport.
#[async_trait]
pub trait TransportRead: Send + 'static {
    /// Read the next inbound text frame.
    ///
    /// `Ok(None)` is normal closure (the peer hung up cleanly). `Err` is any
    /// other read failure.
    async fn read(&mut self) -> Result<Option<String>, TransportError>;
}

/// Write half of a transport. Owns closing the connection.
#[async_trait]
pub trait TransportWrite: Send + 'static {
    /// Write one text frame to the peer.
    async fn write(&mut self, text: &str) -> Result<(), TransportError>;

    /// Close the transport. Must be idempotent.
    async fn close(&mut self);
}
