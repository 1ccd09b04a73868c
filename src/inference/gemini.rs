//! Gemini Live adapter over a raw WebSocket.
//!
//! Speaks the BidiGenerateContent protocol: a `setup` message answered by
//! `setupComplete`, then `realtimeInput` audio and `toolResponse` messages
//! upstream, and `serverContent` / `toolCall` / `goAway` messages downstream.
//! Server frames arrive as either text or binary JSON.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::{
    InferenceConnector, InferenceSink, InferenceSource, InferenceStream, LiveSetup, ResponseUnit,
};
use crate::audio::AudioChunk;
use crate::config::LiveConfig;
use crate::error::{Result, SlidekickError};
use crate::tools::{ToolCall, ToolResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens Gemini Live sessions.
#[derive(Clone)]
pub struct GeminiLiveConnector {
    config: LiveConfig,
}

impl std::fmt::Debug for GeminiLiveConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveConnector")
            .field("model", &self.config.model)
            .field("endpoint", &self.config.endpoint)
            .finish_non_exhaustive()
    }
}

impl GeminiLiveConnector {
    /// Create a connector from live configuration.
    pub fn new(config: LiveConfig) -> Self {
        Self { config }
    }

    fn session_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| SlidekickError::Config(format!("invalid live endpoint: {e}")))?;
        if !self.config.api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", &self.config.api_key);
        }
        Ok(url)
    }

    async fn handshake(&self, setup: &LiveSetup) -> Result<(SplitSink<WsStream, Message>, SplitStream<WsStream>)> {
        let url = self.session_url()?;
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SlidekickError::Inference(format!("connect: {e}")))?;
        let (mut write, mut read) = ws.split();

        let message = setup_message(&self.config, setup);
        write
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| SlidekickError::Inference(format!("send setup: {e}")))?;

        loop {
            let frame = match read.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(SlidekickError::Inference(format!("setup: {e}"))),
                None => {
                    return Err(SlidekickError::Inference(
                        "stream ended during setup".into(),
                    ));
                }
            };
            let payload = match frame {
                Message::Text(text) => serde_json::from_str::<Value>(&text)?,
                Message::Binary(data) => serde_json::from_slice::<Value>(&data)?,
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_default();
                    return Err(SlidekickError::Inference(format!(
                        "closed during setup: {reason}"
                    )));
                }
                _ => continue,
            };
            if payload.get("setupComplete").is_some() {
                return Ok((write, read));
            }
            tracing::debug!("ignoring pre-setup message");
        }
    }
}

#[async_trait]
impl InferenceConnector for GeminiLiveConnector {
    async fn connect(&self, setup: &LiveSetup) -> Result<InferenceStream> {
        tracing::info!(model = %self.config.model, session_id = %setup.session_id, "connecting to Gemini Live");
        let (write, read) = tokio::time::timeout(self.config.setup_timeout(), self.handshake(setup))
            .await
            .map_err(|_| SlidekickError::Inference("setup timed out".into()))??;
        tracing::info!(session_id = %setup.session_id, "Gemini Live session ready");

        Ok(InferenceStream {
            sink: std::sync::Arc::new(GeminiSink {
                write: Mutex::new(write),
                closed: AtomicBool::new(false),
            }),
            source: Box::new(GeminiSource {
                read,
                transcription: String::new(),
            }),
        })
    }
}

/// Build the `setup` message for a session.
pub fn setup_message(config: &LiveConfig, setup: &LiveSetup) -> Value {
    let model = if config.model.starts_with("models/") {
        config.model.clone()
    } else {
        format!("models/{}", config.model)
    };

    let mut body = Map::new();
    body.insert("model".into(), Value::String(model));
    body.insert(
        "generationConfig".into(),
        json!({ "responseModalities": config.response_modalities }),
    );
    if !config.system_instruction.is_empty() {
        body.insert(
            "systemInstruction".into(),
            json!({ "parts": [{ "text": config.system_instruction }] }),
        );
    }
    if !setup.declarations.is_empty() {
        body.insert(
            "tools".into(),
            json!([{ "functionDeclarations": setup.declarations }]),
        );
    }
    if config.transcribe_output {
        body.insert("outputAudioTranscription".into(), json!({}));
    }
    json!({ "setup": body })
}

/// Build a `realtimeInput` audio message.
pub fn audio_message(chunk: &AudioChunk) -> Value {
    json!({
        "realtimeInput": {
            "audio": {
                "data": BASE64.encode(&chunk.data),
                "mimeType": chunk.mime_type,
            }
        }
    })
}

/// Build a `toolResponse` message for one batch.
pub fn tool_response_message(results: &[ToolResult]) -> Value {
    let responses: Vec<Value> = results
        .iter()
        .map(|r| {
            let mut entry = json!({
                "name": r.name,
                "response": r.to_response(),
            });
            if !r.id.is_empty()
                && let Value::Object(map) = &mut entry
            {
                map.insert("id".into(), Value::String(r.id.clone()));
            }
            entry
        })
        .collect();
    json!({ "toolResponse": { "functionResponses": responses } })
}

/// Decode one server message.
///
/// `transcription` accumulates `outputTranscription` fragments across
/// messages; it is flushed into `transcripts` when the turn completes or is
/// interrupted.
pub fn parse_server_message(payload: &Value, transcription: &mut String) -> ResponseUnit {
    let mut unit = ResponseUnit::default();

    if let Some(calls) = payload
        .pointer("/toolCall/functionCalls")
        .and_then(Value::as_array)
    {
        for call in calls {
            let Some(name) = call.get("name").and_then(Value::as_str) else {
                tracing::warn!("function call without name");
                continue;
            };
            let id = call.get("id").and_then(Value::as_str).unwrap_or_default();
            let args = match call.get("args") {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            unit.tool_calls.push(ToolCall::new(id, name, args));
        }
    }

    if let Some(ids) = payload.pointer("/toolCallCancellation/ids") {
        tracing::debug!(%ids, "tool call cancellation");
    }

    if let Some(content) = payload.get("serverContent") {
        let mut audio: Vec<u8> = Vec::new();
        if let Some(parts) = content
            .pointer("/modelTurn/parts")
            .and_then(Value::as_array)
        {
            for part in parts {
                if let Some(data) = part.pointer("/inlineData/data").and_then(Value::as_str) {
                    match BASE64.decode(data) {
                        Ok(bytes) => audio.extend_from_slice(&bytes),
                        Err(e) => tracing::warn!(error = %e, "undecodable inline audio"),
                    }
                }
                let is_thought = part.get("thought").and_then(Value::as_bool) == Some(true);
                if let Some(text) = part.get("text").and_then(Value::as_str)
                    && !is_thought
                {
                    unit.transcripts.push(text.to_owned());
                }
            }
        }
        if !audio.is_empty() {
            unit.audio = Some(Bytes::from(audio));
        }

        if let Some(fragment) = content
            .pointer("/outputTranscription/text")
            .and_then(Value::as_str)
        {
            transcription.push_str(fragment);
        }

        unit.turn_complete = content.get("turnComplete").and_then(Value::as_bool) == Some(true);
        unit.interrupted = content.get("interrupted").and_then(Value::as_bool) == Some(true);
        if unit.turn_complete || unit.interrupted {
            let text = std::mem::take(transcription);
            if !text.trim().is_empty() {
                unit.transcripts.push(text);
            }
        }
    }

    if let Some(go_away) = payload.get("goAway") {
        let time_left = go_away
            .get("timeLeft")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::warn!(time_left, "Gemini Live server will disconnect soon");
    }

    unit
}

/// Map a WebSocket error onto the session error taxonomy.
pub fn classify(err: WsError) -> SlidekickError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            SlidekickError::TransportClosed(err.to_string())
        }
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            SlidekickError::TransportClosed(err.to_string())
        }
        WsError::Io(ref io)
            if matches!(
                io.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
            ) =>
        {
            SlidekickError::TransportClosed(err.to_string())
        }
        other => SlidekickError::TransientIo(other.to_string()),
    }
}

struct GeminiSink {
    write: Mutex<SplitSink<WsStream, Message>>,
    closed: AtomicBool,
}

impl GeminiSink {
    async fn send_json(&self, payload: Value) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SlidekickError::TransportClosed("inference stream closed".into()));
        }
        let mut write = self.write.lock().await;
        write
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(classify)
    }
}

#[async_trait]
impl InferenceSink for GeminiSink {
    async fn send_audio(&self, chunk: &AudioChunk) -> Result<()> {
        self.send_json(audio_message(chunk)).await
    }

    async fn send_tool_results(&self, results: &[ToolResult]) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        self.send_json(tool_response_message(results)).await?;
        tracing::debug!(count = results.len(), "sent tool responses");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut write = self.write.lock().await;
        write.close().await.map_err(classify)
    }
}

struct GeminiSource {
    read: SplitStream<WsStream>,
    transcription: String,
}

#[async_trait]
impl InferenceSource for GeminiSource {
    async fn next_response(&mut self) -> Option<Result<ResponseUnit>> {
        loop {
            let frame = match self.read.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(classify(e))),
            };
            let payload = match frame {
                Message::Text(text) => serde_json::from_str::<Value>(&text),
                Message::Binary(data) => serde_json::from_slice::<Value>(&data),
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                        .unwrap_or_else(|| "no close frame".to_owned());
                    tracing::info!(%reason, "Gemini Live stream closed");
                    return Some(Err(SlidekickError::TransportClosed(reason)));
                }
                _ => continue,
            };
            let payload = match payload {
                Ok(payload) => payload,
                Err(e) => return Some(Err(e.into())),
            };
            let unit = parse_server_message(&payload, &mut self.transcription);
            if !unit.is_empty() || unit.turn_complete || unit.interrupted {
                return Some(Ok(unit));
            }
        }
    }
}
