//! Inference stream adapter contract.
//!
//! The orchestrator talks to the realtime model only through these traits:
//! an [`InferenceConnector`] performs the upstream handshake and yields an
//! [`InferenceStream`], split into a shareable [`InferenceSink`] (audio and
//! tool responses out) and an exclusively owned [`InferenceSource`] (response
//! units in).
//!
//! # Submodules
//!
//! - [`gemini`]: Gemini Live (BidiGenerateContent) over WebSocket

pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::audio::AudioChunk;
use crate::error::Result;
use crate::tools::{ToolCall, ToolDeclaration, ToolResult};

pub use gemini::GeminiLiveConnector;

/// One decoded message from the inference stream.
///
/// Any combination of fields may be populated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseUnit {
    /// Tool calls to execute as one batch.
    pub tool_calls: Vec<ToolCall>,
    /// Synthesized audio for the client.
    pub audio: Option<Bytes>,
    /// Transcript text (model text parts or completed output transcription).
    pub transcripts: Vec<String>,
    /// The model finished its turn.
    pub turn_complete: bool,
    /// The model was interrupted by user speech.
    pub interrupted: bool,
}

impl ResponseUnit {
    /// Whether the unit carries nothing the orchestrator acts on.
    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty() && self.audio.is_none() && self.transcripts.is_empty()
    }
}

/// Session parameters negotiated during the upstream handshake.
#[derive(Debug, Clone, Default)]
pub struct LiveSetup {
    /// Tool declarations advertised to the model.
    pub declarations: Vec<ToolDeclaration>,
    /// Session identifier, for upstream logging.
    pub session_id: String,
}

/// Outbound half of an inference stream. Shared by the forward and response
/// loops.
#[async_trait]
pub trait InferenceSink: Send + Sync {
    /// Forward one audio chunk.
    ///
    /// # Errors
    ///
    /// [`SlidekickError::TransportClosed`](crate::SlidekickError::TransportClosed)
    /// when the stream is gone; any other error is transient.
    async fn send_audio(&self, chunk: &AudioChunk) -> Result<()>;

    /// Send the results of one tool-call batch.
    ///
    /// # Errors
    ///
    /// Same classification as [`send_audio`](Self::send_audio).
    async fn send_tool_results(&self, results: &[ToolResult]) -> Result<()>;

    /// Best-effort graceful close.
    async fn close(&self) -> Result<()>;
}

/// Inbound half of an inference stream.
#[async_trait]
pub trait InferenceSource: Send {
    /// Next response unit, `None` once the stream has ended.
    ///
    /// Errors are classified like [`InferenceSink::send_audio`].
    async fn next_response(&mut self) -> Option<Result<ResponseUnit>>;
}

/// A connected inference stream.
pub struct InferenceStream {
    /// Outbound half.
    pub sink: Arc<dyn InferenceSink>,
    /// Inbound half.
    pub source: Box<dyn InferenceSource>,
}

/// Opens inference streams, one per session.
#[async_trait]
pub trait InferenceConnector: Send + Sync {
    /// Perform the upstream handshake.
    ///
    /// # Errors
    ///
    /// Any error means the session cannot become active.
    async fn connect(&self, setup: &LiveSetup) -> Result<InferenceStream>;
}
