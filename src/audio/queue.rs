//! Bounded audio queue with drop-oldest overflow.
//!
//! The producer (the client receive loop) never blocks: when the queue is
//! full the oldest buffered chunk is evicted to admit the new one. The single
//! consumer (the forward loop) suspends in [`AudioQueue::pop`] until a chunk
//! arrives or the queue is closed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use super::{AudioChunk, LOCAL_QUEUE_CAPACITY, NETWORK_QUEUE_CAPACITY};
use crate::error::{Result, SlidekickError};

/// Log a progress line every this many accepted chunks.
const CHUNK_LOG_INTERVAL: u64 = 100;

struct Inner {
    buf: VecDeque<AudioChunk>,
    closed: bool,
}

/// Fixed-capacity FIFO of audio chunks.
pub struct AudioQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    chunk_count: AtomicU64,
}

impl AudioQueue {
    /// Create a queue holding at most `capacity` chunks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                buf: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            chunk_count: AtomicU64::new(0),
        }
    }

    /// Queue sized for network audio that needs jitter buffering.
    pub fn for_network() -> Self {
        Self::new(NETWORK_QUEUE_CAPACITY)
    }

    /// Queue sized for low-latency local capture.
    pub fn for_local() -> Self {
        Self::new(LOCAL_QUEUE_CAPACITY)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enqueue a chunk, evicting the oldest one when full.
    ///
    /// Returns `false` only after [`close()`](Self::close).
    pub fn push(&self, chunk: AudioChunk) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            if inner.buf.len() >= self.capacity {
                let _ = inner.buf.pop_front();
            }
            inner.buf.push_back(chunk);
        }
        // A stored permit covers a consumer that is between its empty check
        // and `notified().await`.
        self.notify.notify_one();

        let count = self.chunk_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count % CHUNK_LOG_INTERVAL == 0 {
            tracing::debug!(chunks = count, "audio chunks queued");
        }
        true
    }

    /// Wait for the next chunk.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::QueueClosed`] once the queue is closed.
    pub async fn pop(&self) -> Result<AudioChunk> {
        loop {
            {
                let mut inner = self.lock();
                if let Some(chunk) = inner.buf.pop_front() {
                    return Ok(chunk);
                }
                if inner.closed {
                    return Err(SlidekickError::QueueClosed);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Wait up to `timeout` for the next chunk; `Ok(None)` on timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SlidekickError::QueueClosed`] once the queue is closed.
    pub async fn pop_timeout(&self, timeout: Duration) -> Result<Option<AudioChunk>> {
        match tokio::time::timeout(timeout, self.pop()).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Close the queue: drop buffered chunks, reject pushes, wake the consumer.
    pub fn close(&self) {
        let dropped = {
            let mut inner = self.lock();
            inner.closed = true;
            let dropped = inner.buf.len();
            inner.buf.clear();
            dropped
        };
        self.notify.notify_waiters();
        self.notify.notify_one();
        tracing::debug!(
            dropped,
            total = self.chunk_count(),
            "audio queue closed"
        );
    }

    /// Whether [`close()`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of chunks currently buffered.
    pub fn len(&self) -> usize {
        self.lock().buf.len()
    }

    /// Whether no chunks are buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().buf.is_empty()
    }

    /// Maximum number of buffered chunks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total chunks accepted since creation.
    pub fn chunk_count(&self) -> u64 {
        self.chunk_count.load(Ordering::Relaxed)
    }
}
