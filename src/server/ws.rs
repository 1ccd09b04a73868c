//! `/ws`: bridges an axum WebSocket into a session.

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use super::AppState;
use crate::error::{Result, SlidekickError};
use crate::session::{ClientFrame, ClientSink, ClientSource};

pub(super) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    match state
        .orchestrator
        .run(Box::new(SocketSource { stream }), Box::new(SocketSink { sink }))
        .await
    {
        Ok(report) => tracing::info!(
            session_id = %report.session_id,
            audio_chunks = report.audio_chunks,
            "websocket session finished"
        ),
        Err(e) => tracing::error!(error = %e, "websocket session failed"),
    }
}

struct SocketSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl ClientSource for SocketSource {
    async fn next_frame(&mut self) -> Option<Result<ClientFrame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(ClientFrame::Audio(data))),
                Ok(Message::Text(text)) => return Some(Ok(ClientFrame::Text(text.to_string()))),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(SlidekickError::TransportClosed(e.to_string()))),
            }
        }
    }
}

struct SocketSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ClientSink for SocketSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SlidekickError::TransportClosed(e.to_string()))
    }

    async fn send_binary(&mut self, data: Bytes) -> Result<()> {
        self.sink
            .send(Message::Binary(data))
            .await
            .map_err(|e| SlidekickError::TransportClosed(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| SlidekickError::TransportClosed(e.to_string()))
    }
}
