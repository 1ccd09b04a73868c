//! Live voice-control sessions.
//!
//! # Submodules
//!
//! - [`state`]: [`StateManager`], navigation position, slide count, transcript
//! - [`transcript`]: bounded transcript ring buffer
//! - [`gate`]: [`InterruptionGate`] pausing audio forwarding during tool batches
//! - [`client`]: client transport contract and JSON messages
//! - [`orchestrator`]: [`SessionOrchestrator`] and the per-session loops

pub mod client;
pub mod gate;
pub mod orchestrator;
pub mod state;
pub mod transcript;

pub use client::{ClientEvent, ClientFrame, ClientLink, ClientSink, ClientSource, ControlMessage};
pub use gate::{GateGuard, GatePass, InterruptionGate};
pub use orchestrator::{
    Session, SessionHandle, SessionOrchestrator, SessionPhase, SessionReport, SessionSettings,
};
pub use state::{Direction, PresentationContext, SessionMetadata, StateManager};
pub use transcript::TranscriptBuffer;
