use crate::models::{DownloadProgress, DownloadSnapshot, DownloadState, StartDecision};
use tokio::sync::watch;

/// Sole owner of the download slot. Every mutation is one of the
/// transitions below; observers only get read access through `subscribe`.
pub struct StateManager {
    snapshot: watch::Sender<DownloadSnapshot>,
}

impl StateManager {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(DownloadSnapshot::default());
        Self { snapshot }
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        *self.snapshot.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DownloadSnapshot> {
        self.snapshot.subscribe()
    }

    /// Decides what a start request means and, for `Begin`, claims the slot
    /// in the same critical section.
    pub fn try_begin(&self) -> StartDecision {
        let mut decision = StartDecision::Ignore;
        self.snapshot.send_if_modified(|current| {
            decision = current.state.on_start();
            if decision != StartDecision::Begin {
                return false;
            }
            *current = DownloadSnapshot {
                state: DownloadState::Downloading,
                progress: DownloadProgress::default(),
            };
            true
        });
        decision
    }

    pub fn set_total(&self, total_bytes: u64) -> DownloadProgress {
        self.update_progress(|progress| progress.with_total(total_bytes))
    }

    pub fn record_chunk(&self, len: usize) -> DownloadProgress {
        self.update_progress(|progress| progress.record_chunk(len))
    }

    pub fn complete(&self) {
        self.snapshot.send_if_modified(|current| {
            if current.state != DownloadState::Downloading {
                return false;
            }
            current.state = DownloadState::Completed;
            true
        });
    }

    /// Failure and cancellation path: back to `Idle` with zeroed progress.
    pub fn revert(&self) {
        self.snapshot.send_replace(DownloadSnapshot::default());
    }

    /// `Completed -> Idle`. Refused in every other state.
    pub fn reset(&self) -> bool {
        self.snapshot.send_if_modified(|current| {
            if current.state != DownloadState::Completed {
                return false;
            }
            *current = DownloadSnapshot::default();
            true
        })
    }

    fn update_progress(
        &self,
        apply: impl FnOnce(DownloadProgress) -> DownloadProgress,
    ) -> DownloadProgress {
        let mut updated = DownloadProgress::default();
        self.snapshot.send_if_modified(|current| {
            if current.state != DownloadState::Downloading {
                return false;
            }
            current.progress = apply(current.progress);
            updated = current.progress;
            true
        });
        updated
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}
