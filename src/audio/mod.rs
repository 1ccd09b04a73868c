//! Audio chunk type and the bounded queue between client and inference stream.

pub mod queue;

pub use queue::AudioQueue;

use bytes::Bytes;

/// Input sample rate expected by the realtime model (Hz).
pub const SAMPLE_RATE: u32 = 16_000;
/// Mono input.
pub const CHANNELS: u16 = 1;
/// 16-bit little-endian PCM.
pub const SAMPLE_WIDTH: usize = 2;
/// Samples per capture chunk (~100ms at 16kHz).
pub const CHUNK_SIZE: usize = 1600;
/// Format tag attached to every chunk sent upstream.
pub const PCM_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Queue capacity for browser audio arriving over the network.
pub const NETWORK_QUEUE_CAPACITY: usize = 100;
/// Queue capacity for low-latency local capture.
pub const LOCAL_QUEUE_CAPACITY: usize = 5;

/// A chunk of raw PCM audio with its format tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Raw little-endian PCM bytes.
    pub data: Bytes,
    /// MIME type describing `data`.
    pub mime_type: &'static str,
}

impl AudioChunk {
    /// Wrap client PCM bytes in the upstream input format.
    pub fn pcm(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            mime_type: PCM_MIME_TYPE,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback duration of the chunk in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        let bytes_per_second = u64::from(SAMPLE_RATE) * u64::from(CHANNELS) * SAMPLE_WIDTH as u64;
        self.data.len() as u64 * 1000 / bytes_per_second
    }
}
