//! Client connection contract and the JSON messages exchanged with the browser.
//!
//! The orchestrator never touches a concrete socket: the server hands it a
//! [`ClientSource`] and a [`ClientSink`]. Outbound traffic goes through
//! [`ClientLink`], which is shared by the response loop and background summary
//! tasks and turns the first failed send into a session-wide disconnect.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SlidekickError};

/// One inbound frame from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Raw PCM audio.
    Audio(Bytes),
    /// JSON control message text.
    Text(String),
}

/// Read half of a client connection.
#[async_trait]
pub trait ClientSource: Send {
    /// Next frame, `None` once the client disconnects.
    ///
    /// A returned error is treated as unrecoverable for the receive loop.
    async fn next_frame(&mut self) -> Option<Result<ClientFrame>>;
}

/// Write half of a client connection.
#[async_trait]
pub trait ClientSink: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Send a binary frame.
    async fn send_binary(&mut self, data: Bytes) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Structured control message sent by the frontend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Deck loaded: slide count and position.
    SlideInfo {
        #[serde(default)]
        total_slides: i64,
        #[serde(default)]
        current_slide: i64,
    },
    /// User navigated locally.
    SlideSync {
        #[serde(default)]
        current_slide: i64,
    },
    /// Explicit summary request.
    RequestSummary {},
    /// Any other `type`; ignored.
    #[serde(other)]
    Unknown,
}

impl ControlMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::Json`] for malformed JSON or a missing `type`.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Event pushed to the frontend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Session status change.
    Status { status: String, message: String },
    /// Model transcript text.
    Transcript { text: String },
    /// A tool call is about to run.
    IntentDetected { tool: String, args: Value },
    /// Result of a non-navigation tool.
    ToolResult {
        tool: String,
        status: String,
        data: Value,
    },
    /// Navigation the frontend should apply.
    SlideCommand {
        action: String,
        slide_index: u64,
        status: String,
    },
    /// Generated summary to inject into the deck.
    InjectSummary { html: String, summary: String },
}

impl ClientEvent {
    /// `status{connected}` sent once both handshakes succeed.
    pub fn connected() -> Self {
        Self::Status {
            status: "connected".to_owned(),
            message: "Voice control active".to_owned(),
        }
    }

    /// `status{error}` sent before closing on a failed upstream handshake.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Status {
            status: "error".to_owned(),
            message: message.into(),
        }
    }

    /// Wire `type` of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Transcript { .. } => "transcript",
            Self::IntentDetected { .. } => "intent_detected",
            Self::ToolResult { .. } => "tool_result",
            Self::SlideCommand { .. } => "slide_command",
            Self::InjectSummary { .. } => "inject_summary",
        }
    }
}

enum Outbound {
    Text(String),
    Binary(Bytes),
}

/// Shared outbound half of a session's client connection.
pub struct ClientLink {
    sink: Mutex<Box<dyn ClientSink>>,
    connected: AtomicBool,
    cancel: CancellationToken,
}

impl ClientLink {
    /// Wrap a sink; a failed send cancels `cancel`.
    pub fn new(sink: Box<dyn ClientSink>, cancel: CancellationToken) -> Self {
        Self {
            sink: Mutex::new(sink),
            connected: AtomicBool::new(true),
            cancel,
        }
    }

    /// Whether the client is still considered connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Mark the client gone and cancel the session.
    pub fn mark_disconnected(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::debug!("client marked disconnected");
        }
        self.cancel.cancel();
    }

    /// Serialize and send an event.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::TransportClosed`] if the client is gone or
    /// the send fails; the link is then disconnected.
    pub async fn send_event(&self, event: &ClientEvent) -> Result<()> {
        let text = serde_json::to_string(event)?;
        self.send(event.kind(), Outbound::Text(text)).await
    }

    /// Send model audio.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::TransportClosed`] if the client is gone or
    /// the send fails.
    pub async fn send_audio(&self, data: Bytes) -> Result<()> {
        self.send("audio", Outbound::Binary(data)).await
    }

    async fn send(&self, kind: &'static str, frame: Outbound) -> Result<()> {
        if !self.is_connected() {
            return Err(SlidekickError::TransportClosed("client disconnected".into()));
        }
        let mut sink = self.sink.lock().await;
        let sent = match frame {
            Outbound::Text(text) => sink.send_text(text).await,
            Outbound::Binary(data) => sink.send_binary(data).await,
        };
        match sent {
            Ok(()) => {
                tracing::trace!(kind, "sent to client");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind, error = %e, "send to client failed");
                drop(sink);
                self.mark_disconnected();
                Err(SlidekickError::TransportClosed(e.to_string()))
            }
        }
    }

    /// Best-effort close; errors are logged and suppressed.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::Release);
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            tracing::debug!(error = %e, "client close failed");
        }
    }
}
