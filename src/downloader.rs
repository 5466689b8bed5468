use crate::config::DownloadConfig;
use crate::error::{DownloadError, Result};
use crate::models::{
    Artifact, DownloadEvent, DownloadProgress, DownloadRequest, DownloadSnapshot, DownloadState,
    StartDecision, StartOutcome,
};
use crate::sink::ArtifactSink;
use crate::source::ArtifactSource;
use crate::state::StateManager;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest buffer reserved up front from a probed size.
const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// Drives the single download slot: probe, stream, deliver.
///
/// Cloning yields another handle to the same slot, so a UI can keep one
/// handle for reads and hand another to the task running `start`.
#[derive(Clone)]
pub struct DownloadController {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn ArtifactSource>,
    sink: Arc<dyn ArtifactSink>,
    config: DownloadConfig,
    state: StateManager,
    events: broadcast::Sender<DownloadEvent>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl DownloadController {
    pub fn new(
        source: Arc<dyn ArtifactSource>,
        sink: Arc<dyn ArtifactSink>,
        config: DownloadConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                source,
                sink,
                config,
                state: StateManager::new(),
                events,
                cancel: Mutex::new(None),
            }),
        }
    }

    pub fn current_state(&self) -> DownloadState {
        self.inner.state.snapshot().state
    }

    pub fn current_progress(&self) -> DownloadProgress {
        self.inner.state.snapshot().progress
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        self.inner.state.snapshot()
    }

    /// Latest-value view of state and progress.
    pub fn watch(&self) -> watch::Receiver<DownloadSnapshot> {
        self.inner.state.subscribe()
    }

    /// Every event emitted from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.inner.events.subscribe()
    }

    /// Install / open action.
    ///
    /// From `Idle` this runs the whole transfer and resolves when it ends.
    /// From `Completed` it only emits [`DownloadEvent::OpenRequested`]; while
    /// a transfer is running it returns [`StartOutcome::Ignored`].
    /// A failed attempt leaves the controller `Idle` and is never retried here.
    pub async fn start(&self, request: &DownloadRequest) -> Result<StartOutcome> {
        let token = {
            let mut slot = self.lock_cancel();
            match self.inner.state.try_begin() {
                StartDecision::Ignore => {
                    debug!(locator = %request.locator, "start ignored, transfer already running");
                    return Ok(StartOutcome::Ignored);
                }
                StartDecision::Open => {
                    info!(file_name = %request.file_name, "download already completed, opening");
                    self.emit(DownloadEvent::OpenRequested {
                        file_name: request.file_name.clone(),
                    });
                    return Ok(StartOutcome::Opened);
                }
                StartDecision::Begin => {}
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        let attempt = AttemptGuard {
            controller: self,
            armed: true,
        };

        info!(locator = %request.locator, "download started");
        self.emit(DownloadEvent::Started);

        let result = self.transfer(request, &token).await;
        attempt.disarm();
        self.lock_cancel().take();

        match result {
            Ok(location) => {
                let received_bytes = self.current_progress().received_bytes;
                self.inner.state.complete();
                info!(location = %location.display(), received_bytes, "download completed");
                self.emit(DownloadEvent::Completed {
                    location: location.clone(),
                });
                Ok(StartOutcome::Completed {
                    location,
                    received_bytes,
                })
            }
            Err(DownloadError::Cancelled) => {
                self.inner.state.revert();
                info!(locator = %request.locator, "download cancelled");
                self.emit(DownloadEvent::Cancelled);
                Err(DownloadError::Cancelled)
            }
            Err(e) => {
                self.inner.state.revert();
                warn!(locator = %request.locator, error = %e, "download failed");
                self.emit(DownloadEvent::Failed {
                    message: e.user_message().to_string(),
                });
                Err(e)
            }
        }
    }

    /// Aborts the running transfer. Returns `false` when nothing is running.
    pub fn cancel(&self) -> bool {
        match self.lock_cancel().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns a completed slot to `Idle` so the next `start` downloads again.
    pub fn reset(&self) -> bool {
        let reset = self.inner.state.reset();
        if reset {
            info!("download slot reset");
        }
        reset
    }

    async fn transfer(&self, request: &DownloadRequest, token: &CancellationToken) -> Result<PathBuf> {
        let inner = &self.inner;
        let timeout = inner.config.timeout;

        let probed = guarded(token, timeout, inner.source.probe_size(&request.locator))
            .await
            .and_then(|probe| probe);
        let total_bytes = match probed {
            Ok(Some(total)) => total,
            Ok(None) => {
                warn!(locator = %request.locator, "size probe returned no length, progress limited to bytes");
                0
            }
            Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
            Err(e) => {
                warn!(locator = %request.locator, error = %e, "size probe failed, progress limited to bytes");
                0
            }
        };

        if total_bytes > 0 {
            inner.state.set_total(total_bytes);
            self.emit(DownloadEvent::TotalKnown { total_bytes });
        }

        let mut stream = guarded(token, timeout, inner.source.open_stream(&request.locator)).await??;
        let mut buffer = BytesMut::with_capacity(total_bytes.min(MAX_PREALLOCATION) as usize);

        while let Some(chunk) = guarded(token, timeout, stream.next()).await? {
            let chunk = chunk?;
            for piece in split_chunk(chunk, inner.config.max_chunk_bytes) {
                buffer.extend_from_slice(&piece);
                let progress = inner.state.record_chunk(piece.len());
                debug!(
                    received_bytes = progress.received_bytes,
                    percent = progress.percent,
                    "chunk received"
                );
                self.emit(DownloadEvent::Progress(progress));

                if let Some(pace) = inner.config.pace {
                    guarded(token, None, tokio::time::sleep(pace)).await?;
                }
            }
        }

        let received = buffer.len() as u64;
        if total_bytes > 0 && received != total_bytes {
            return Err(DownloadError::SizeMismatch {
                expected: total_bytes,
                received,
            });
        }

        let artifact = Artifact {
            file_name: request.file_name.clone(),
            bytes: buffer.freeze(),
        };
        guarded(token, None, inner.sink.deliver(&artifact)).await?
    }

    fn emit(&self, event: DownloadEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.inner.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles an attempt whose `start` future was dropped before it finished
/// (aborted task, lost `select!`, outer timeout): the slot goes back to
/// `Idle` exactly as on cancellation.
struct AttemptGuard<'a> {
    controller: &'a DownloadController,
    armed: bool,
}

impl AttemptGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.controller.lock_cancel().take();
        self.controller.inner.state.revert();
        warn!("download dropped before it finished, slot reverted to idle");
        self.controller.emit(DownloadEvent::Cancelled);
    }
}

/// Races `fut` against cancellation and the optional timeout.
async fn guarded<F: Future>(
    token: &CancellationToken,
    timeout: Option<Duration>,
    fut: F,
) -> Result<F::Output> {
    let timed = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| DownloadError::Timeout(limit)),
            None => Ok(fut.await),
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(DownloadError::Cancelled),
        result = timed => result,
    }
}

/// Re-slices a received buffer into progress steps of at most `max` bytes.
/// Empty buffers produce no steps.
fn split_chunk(mut chunk: Bytes, max: Option<usize>) -> Vec<Bytes> {
    let max = match max {
        Some(max) if max > 0 => max,
        _ if chunk.is_empty() => return Vec::new(),
        _ => return vec![chunk],
    };

    let mut pieces = Vec::with_capacity(chunk.len().div_ceil(max));
    while !chunk.is_empty() {
        let take = max.min(chunk.len());
        pieces.push(chunk.split_to(take));
    }
    pieces
}
