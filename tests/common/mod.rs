#![allow(dead_code)]

use app_install_dl::error::{DownloadError, Result};
use app_install_dl::{Artifact, ArtifactSink, ArtifactSource, ChunkStream, DownloadEvent};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, broadcast};

/// One scripted step of a streamed body.
#[derive(Clone)]
pub enum Step {
    Chunk(usize),
    Fail(&'static str),
    /// Waits until the gate is opened, then continues.
    Gate,
    /// Never yields again.
    Hang,
}

/// In-memory source replaying a scripted body.
pub struct ScriptedSource {
    probe: std::result::Result<Option<u64>, &'static str>,
    probe_hangs: bool,
    steps: Vec<Step>,
    pub gate: Arc<Notify>,
    pub opens: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(probe: std::result::Result<Option<u64>, &'static str>, steps: Vec<Step>) -> Self {
        Self {
            probe,
            probe_hangs: false,
            steps,
            gate: Arc::new(Notify::new()),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn chunks(total: Option<u64>, sizes: &[usize]) -> Self {
        Self::new(Ok(total), sizes.iter().map(|&n| Step::Chunk(n)).collect())
    }

    /// `probe_size` never answers.
    pub fn hanging_size_check(mut self) -> Self {
        self.probe_hangs = true;
        self
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactSource for ScriptedSource {
    async fn probe_size(&self, _locator: &str) -> Result<Option<u64>> {
        if self.probe_hangs {
            std::future::pending::<()>().await;
        }
        self.probe
            .map_err(|reason| DownloadError::MetadataUnavailable(reason.to_string()))
    }

    async fn open_stream(&self, _locator: &str) -> Result<ChunkStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.clone();
        let steps = self.steps.clone();

        Ok(stream::iter(steps)
            .then(move |step| {
                let gate = gate.clone();
                async move {
                    match step {
                        Step::Chunk(n) => Some(Ok(Bytes::from(vec![0xA5u8; n]))),
                        Step::Fail(reason) => Some(Err(DownloadError::TransferFailed(reason.to_string()))),
                        Step::Gate => {
                            gate.notified().await;
                            None
                        }
                        Step::Hang => {
                            std::future::pending::<()>().await;
                            None
                        }
                    }
                }
            })
            .filter_map(|item| async move { item })
            .boxed())
    }
}

/// Sink keeping delivered artifacts in memory.
#[derive(Default)]
pub struct MemorySink {
    pub delivered: Mutex<Vec<Artifact>>,
    pub fail: bool,
    /// Time spent "writing" before the artifact is stored.
    pub delay: Option<Duration>,
    /// Signalled when `deliver` is entered.
    pub entered: Arc<Notify>,
}

impl MemorySink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf> {
        self.entered.notify_one();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(std::io::Error::other("disk full").into());
        }
        self.delivered.lock().unwrap().push(artifact.clone());
        Ok(PathBuf::from("memory").join(&artifact.file_name))
    }
}

/// Everything buffered on the receiver so far.
pub fn drain(events: &mut broadcast::Receiver<DownloadEvent>) -> Vec<DownloadEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

pub fn percents(events: &[DownloadEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|event| match event {
            DownloadEvent::Progress(progress) => Some(progress.percent),
            _ => None,
        })
        .collect()
}
