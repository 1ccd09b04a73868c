//! Presentation state shared by the session loops.
//!
//! [`StateManager`] owns the navigation position, the slide count reported by
//! the frontend, the transcript history and session metadata. Every operation
//! takes the single internal lock for its whole (short, in-memory) duration,
//! so concurrent callers observe some serial order of operations.

use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::transcript::TranscriptBuffer;
use crate::error::{Result, SlidekickError};

/// Navigation request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// One slide forward.
    Next,
    /// One slide back.
    Prev,
    /// Absolute position (requires an index).
    Jump,
}

impl Direction {
    /// Wire name of the direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Prev => "prev",
            Self::Jump => "jump",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = SlidekickError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "next" => Ok(Self::Next),
            "prev" => Ok(Self::Prev),
            "jump" => Ok(Self::Jump),
            other => Err(SlidekickError::InvalidArgument(format!(
                "invalid direction: {other}"
            ))),
        }
    }
}

/// Session metadata exposed in the presentation context.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata {
    /// When the session (or the last reset) started.
    pub started_at: DateTime<Utc>,
    /// Session identifier, once assigned.
    pub session_id: Option<String>,
    /// Free-form extension values.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SessionMetadata {
    fn fresh() -> Self {
        Self {
            started_at: Utc::now(),
            session_id: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Snapshot of the presentation state.
#[derive(Debug, Clone, Serialize)]
pub struct PresentationContext {
    /// Zero-based current slide.
    pub current_slide: usize,
    /// Total slides (0 = unknown).
    pub total_slides: usize,
    /// Copy of the session metadata.
    pub session_metadata: SessionMetadata,
}

struct Inner {
    current_slide: usize,
    total_slides: usize,
    transcript: TranscriptBuffer,
    metadata: SessionMetadata,
}

/// Lock-guarded presentation state for one session.
///
/// The frontend is the source of truth for the slide count and position; this
/// manager tracks them for tool responses and summaries.
pub struct StateManager {
    inner: Mutex<Inner>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(0)
    }
}

fn clamp_index(value: i64) -> usize {
    usize::try_from(value.max(0)).unwrap_or(usize::MAX)
}

impl StateManager {
    /// Create state for a deck of `total_slides` slides (0 = unknown).
    pub fn new(total_slides: usize) -> Self {
        tracing::debug!(total_slides, "state manager initialized");
        Self {
            inner: Mutex::new(Inner {
                current_slide: 0,
                total_slides,
                transcript: TranscriptBuffer::default(),
                metadata: SessionMetadata::fresh(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Move the current slide and return the new zero-based index.
    ///
    /// With a known slide count the result is clamped to the deck; with an
    /// unknown count (`0`) `next` grows without bound.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::InvalidArgument`] for `jump` without an
    /// index. State is unchanged on error.
    pub fn navigate(&self, direction: Direction, index: Option<i64>) -> Result<usize> {
        let mut inner = self.lock();
        let total = inner.total_slides;
        let current = inner.current_slide;

        let new_index = match direction {
            Direction::Next => {
                if total > 0 {
                    current.saturating_add(1).min(total - 1)
                } else {
                    current.saturating_add(1)
                }
            }
            Direction::Prev => current.saturating_sub(1),
            Direction::Jump => {
                let Some(index) = index else {
                    return Err(SlidekickError::InvalidArgument(
                        "index required for 'jump' navigation".to_owned(),
                    ));
                };
                let target = clamp_index(index);
                if total > 0 { target.min(total - 1) } else { target }
            }
        };

        inner.current_slide = new_index;
        tracing::debug!(%direction, from = current, to = new_index, "navigation");
        Ok(new_index)
    }

    /// Parse a wire direction and navigate.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::InvalidArgument`] for unknown directions or a
    /// `jump` without an index.
    pub fn navigate_str(&self, direction: &str, index: Option<i64>) -> Result<usize> {
        self.navigate(direction.parse()?, index)
    }

    /// Set the current slide (negative values clamp to 0).
    pub fn set_current_slide(&self, index: i64) {
        let mut inner = self.lock();
        inner.current_slide = clamp_index(index);
        tracing::debug!(current_slide = inner.current_slide, "current slide set");
    }

    /// Current zero-based slide.
    pub fn get_current_slide(&self) -> usize {
        self.lock().current_slide
    }

    /// Set the deck size (negative values clamp to 0).
    pub fn set_total_slides(&self, total: i64) {
        let mut inner = self.lock();
        inner.total_slides = clamp_index(total);
        tracing::info!(total_slides = inner.total_slides, "total slides set");
    }

    /// Deck size (0 = unknown).
    pub fn get_total_slides(&self) -> usize {
        self.lock().total_slides
    }

    /// Append a transcript entry.
    pub fn add_transcript(&self, text: impl Into<String>) {
        self.lock().transcript.push(text);
    }

    /// Transcript joined with newlines.
    pub fn get_transcript(&self) -> String {
        self.lock().transcript.joined()
    }

    /// Number of retained transcript entries.
    pub fn transcript_len(&self) -> usize {
        self.lock().transcript.len()
    }

    /// Snapshot of position, slide count and metadata.
    pub fn get_context(&self) -> PresentationContext {
        let inner = self.lock();
        PresentationContext {
            current_slide: inner.current_slide,
            total_slides: inner.total_slides,
            session_metadata: inner.metadata.clone(),
        }
    }

    /// Record the session identifier.
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.lock().metadata.session_id = Some(session_id.into());
    }

    /// Store an extension value in the session metadata.
    pub fn set_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        self.lock().metadata.extra.insert(key.into(), value);
    }

    /// Reset position, transcript and metadata (fresh start timestamp).
    ///
    /// The slide count is kept: it describes the loaded deck, not the talk.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.current_slide = 0;
        inner.transcript.clear();
        inner.metadata = SessionMetadata::fresh();
        tracing::debug!("state manager reset");
    }
}
