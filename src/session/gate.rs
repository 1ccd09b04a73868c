//! Interruption gate between the forward loop and tool-call batches.
//!
//! The gate is an open/closed signal (open by default) plus a batch lock.
//! The forward loop takes a shared [`GatePass`] around each upstream send and
//! a tool batch takes the exclusive [`GateGuard`]. A batch therefore waits for
//! an in-flight send to finish, and no send starts until the batch guard is
//! dropped, on every exit path.

use std::sync::Arc;

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock, watch};

/// Shared open/closed signal with batch exclusion. Cheap to clone.
#[derive(Clone)]
pub struct InterruptionGate {
    signal: Arc<watch::Sender<bool>>,
    batch: Arc<RwLock<()>>,
}

impl Default for InterruptionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InterruptionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptionGate")
            .field("open", &self.is_open())
            .finish()
    }
}

impl InterruptionGate {
    /// Create an open gate.
    pub fn new() -> Self {
        let (signal, _) = watch::channel(true);
        Self {
            signal: Arc::new(signal),
            batch: Arc::new(RwLock::new(())),
        }
    }

    /// Close the gate.
    pub fn close(&self) {
        self.signal.send_replace(false);
    }

    /// Open the gate.
    pub fn open(&self) {
        self.signal.send_replace(true);
    }

    /// Whether the gate is currently open.
    pub fn is_open(&self) -> bool {
        *self.signal.borrow()
    }

    /// Suspend until the gate is open.
    pub async fn wait_until_open(&self) {
        let mut rx = self.signal.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|open| *open).await;
    }

    /// Wait for the gate to open and hold it open for one send.
    ///
    /// A batch cannot start while the returned pass is alive.
    pub async fn pass(&self) -> GatePass {
        loop {
            self.wait_until_open().await;
            let guard = Arc::clone(&self.batch).read_owned().await;
            // A manual close() may have raced in after the wait.
            if self.is_open() {
                return GatePass { _guard: guard };
            }
            drop(guard);
        }
    }

    /// Close the gate for a tool-call batch.
    ///
    /// New sends stop immediately; the returned guard is issued once any
    /// in-flight send has released its pass. Dropping the guard reopens the
    /// gate. If this future is dropped before completing, the gate is
    /// reopened as well.
    pub async fn close_for_batch(&self) -> GateGuard {
        self.close();
        let reopen = Reopen {
            signal: Arc::clone(&self.signal),
        };
        let write = Arc::clone(&self.batch).write_owned().await;
        GateGuard {
            _reopen: reopen,
            _write: write,
        }
    }
}

struct Reopen {
    signal: Arc<watch::Sender<bool>>,
}

impl Drop for Reopen {
    fn drop(&mut self) {
        self.signal.send_replace(true);
    }
}

/// Exclusive hold on the gate for one tool-call batch.
///
/// Field order matters: the signal reopens before the batch lock is released,
/// so a waiting sender sees the gate open when it acquires its pass.
#[must_use = "the gate reopens as soon as the guard is dropped"]
pub struct GateGuard {
    _reopen: Reopen,
    _write: OwnedRwLockWriteGuard<()>,
}

/// Shared hold on an open gate for one upstream send.
#[must_use = "the pass only excludes batches while it is held"]
pub struct GatePass {
    _guard: OwnedRwLockReadGuard<()>,
}
