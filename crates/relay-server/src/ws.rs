//! WebSocket entry point: upgrades the connection and runs it through the
//! hub's pump via a transport adapter.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_core::{MessageTransport, TransportError, TransportRead, TransportWrite};
use relay_hub::run_pump;

use crate::server::AppState;

/// `GET /api/v1/ws/{id}` — open a device connection.
///
/// The raw path segment is handed to the pump untouched; id validation and
/// the diagnostic frame for a bad id happen there, after the upgrade, so the
/// device sees the reason on the socket it opened.
pub async fn connect(
    ws: WebSocketUpgrade,
    Path(raw_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        run_pump(
            WsTransport::new(socket),
            &raw_id,
            state.registry,
            state.shutdown,
            state.inbound_buffer,
        )
        .await;
    })
}

/// Adapter from an upgraded axum WebSocket to the hub's transport contract.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

pub struct WsRead {
    stream: SplitStream<WebSocket>,
}

pub struct WsWrite {
    sink: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl MessageTransport for WsTransport {
    type Read = WsRead;
    type Write = WsWrite;

    fn split(self) -> (WsRead, WsWrite) {
        let (sink, stream) = self.socket.split();
        (WsRead { stream }, WsWrite { sink, closed: false })
    }
}

#[async_trait]
impl TransportRead for WsRead {
    async fn read(&mut self) -> Result<Option<String>, TransportError> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                // a close frame or the stream ending is an orderly hangup;
                // abnormal drops surface as Err from the stream
                Ok(Message::Close(_)) => return Ok(None),
                // axum answers pings itself; binary frames carry nothing
                // for this protocol
                Ok(_) => continue,
                Err(err) => return Err(TransportError::new(err.to_string())),
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl TransportWrite for WsWrite {
    async fn write(&mut self, text: &str) -> Result<(), TransportError> {
        self.sink
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|err| TransportError::new(err.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}
