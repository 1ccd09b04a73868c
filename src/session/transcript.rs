//! Bounded transcript history.

use std::collections::VecDeque;

/// Number of transcript entries retained per session.
pub const TRANSCRIPT_CAPACITY: usize = 100;

/// Ring buffer of the most recent transcript entries, oldest first.
#[derive(Debug, Clone)]
pub struct TranscriptBuffer {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for TranscriptBuffer {
    fn default() -> Self {
        Self::new(TRANSCRIPT_CAPACITY)
    }
}

impl TranscriptBuffer {
    /// Create a buffer keeping at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest beyond capacity.
    pub fn push(&mut self, text: impl Into<String>) {
        while self.entries.len() >= self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(text.into());
    }

    /// Entries joined with newlines.
    pub fn joined(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(entry);
        }
        out
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}
