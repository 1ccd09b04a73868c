//! slidekick: voice-controlled slide deck backend.
//!
//! A browser streams microphone audio over a WebSocket; each connection gets
//! a session that forwards the audio to a realtime inference stream, executes
//! the model's tool calls (slide navigation, context queries, summaries) and
//! relays model audio, transcripts and slide commands back to the browser.
//!
//! # Architecture
//!
//! - **Audio**: bounded drop-oldest [`audio::AudioQueue`] between the client
//!   and the upstream stream
//! - **Session**: [`session::SessionOrchestrator`] runs the receive, forward
//!   and response loops over shared [`session::StateManager`] state, with an
//!   [`session::InterruptionGate`] pausing audio while tools execute
//! - **Tools**: [`tools::ToolExecutor`] registry and the built-in slide tools
//! - **Inference**: transport-agnostic stream contract plus the Gemini Live
//!   adapter
//! - **Summary**: deck digests and live presentation summaries
//! - **Server**: `axum` HTTP/WebSocket surface

pub mod audio;
pub mod config;
pub mod error;
pub mod inference;
pub mod server;
pub mod session;
pub mod summary;
pub mod tools;

pub use config::SlidekickConfig;
pub use error::{Result, SlidekickError};
pub use server::SlidekickServer;
pub use session::{SessionOrchestrator, SessionReport};
