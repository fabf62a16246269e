//! One-shot readiness latch
//!
//! Both output readers hold a clone and try to fire it when they see the
//! marker. Only the first attempt is delivered; the rest are no-ops.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// Which output stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamName::Stdout => "stdout",
            StreamName::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal delivered when the marker is observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadySignal {
    /// Stream that reported the marker first
    pub stream: StreamName,
    /// The full line containing the marker
    pub line: String,
}

/// Writer side of the readiness latch
#[derive(Debug, Clone)]
pub struct ReadinessLatch {
    tx: Arc<Mutex<Option<oneshot::Sender<ReadySignal>>>>,
}

/// Waiting side of the readiness latch
pub type ReadinessWaiter = oneshot::Receiver<ReadySignal>;

impl ReadinessLatch {
    /// Create a latch and the receiver that resolves when it fires
    pub fn new() -> (Self, ReadinessWaiter) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Fire the latch. Returns true only for the attempt that won.
    pub fn fire(&self, signal: ReadySignal) -> bool {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            // A dropped receiver still counts as fired; nobody else may win.
            Some(tx) => {
                let _ = tx.send(signal);
                true
            }
            None => false,
        }
    }

    /// Whether the latch has already fired
    #[cfg(test)]
    pub fn is_fired(&self) -> bool {
        match self.tx.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}
