//! Progress ticks and pause/resume capabilities for transfers

use std::sync::Arc;
use tokio::sync::watch;

/// One progress tick emitted by a transfer stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Bytes received in this tick
    pub chunk: u64,
    /// Bytes received so far for the current candidate
    pub transferred: u64,
    /// Total bytes expected, if the source declared it
    pub total: Option<u64>,
    /// URL the bytes come from
    pub source: String,
}

/// What a progress sink wants the stream to do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressControl {
    Continue,
    Cancel,
}

/// Receives progress ticks from the worker that owns the transfer
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: &TransferProgress) -> ProgressControl;
}

impl<F> ProgressSink for F
where
    F: Fn(&TransferProgress) -> ProgressControl + Send + Sync,
{
    fn on_progress(&self, progress: &TransferProgress) -> ProgressControl {
        self(progress)
    }
}

/// Shared progress sink attached to a request
pub type ProgressCallback = Arc<dyn ProgressSink>;

/// Called by a stream source with a handle while the transfer is live,
/// and with `None` once the request is finished
pub type PauseRegistrar = Arc<dyn Fn(Option<PauseHandle>) + Send + Sync>;

/// Caller-side pause/resume control of one live transfer
#[derive(Debug, Clone)]
pub struct PauseHandle {
    state: Arc<watch::Sender<bool>>,
}

impl PauseHandle {
    /// Stop emitting chunks; the connection stays open
    pub fn pause(&self) {
        self.state.send_replace(true);
    }

    /// Continue from the current position
    pub fn resume(&self) {
        self.state.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.state.borrow()
    }
}

/// Stream-side view of a [`PauseHandle`]
#[derive(Debug)]
pub struct PauseGate {
    state: watch::Receiver<bool>,
}

impl PauseGate {
    /// Wait until the transfer is not paused
    pub async fn wait_resumed(&mut self) {
        // Every handle dropped means nobody can pause any more.
        let _ = self.state.wait_for(|paused| !*paused).await;
    }
}

/// Create a connected handle/gate pair in the running state
pub fn pause_pair() -> (PauseHandle, PauseGate) {
    let (tx, rx) = watch::channel(false);
    (PauseHandle { state: Arc::new(tx) }, PauseGate { state: rx })
}
