use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Lifecycle of the single download slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    #[default]
    Idle,
    Downloading,
    Completed,
}

/// What a `start` request means in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    /// Idle: begin a fresh transfer.
    Begin,
    /// Completed: signal "open" intent, no transfer.
    Open,
    /// Downloading: ignore the re-entrant request.
    Ignore,
}

impl DownloadState {
    pub fn on_start(self) -> StartDecision {
        match self {
            DownloadState::Idle => StartDecision::Begin,
            DownloadState::Downloading => StartDecision::Ignore,
            DownloadState::Completed => StartDecision::Open,
        }
    }

    /// Label the install button shows for this state.
    pub fn action_label(self) -> &'static str {
        match self {
            DownloadState::Idle => "Install",
            DownloadState::Downloading => "Downloading...",
            DownloadState::Completed => "Open",
        }
    }
}

/// Byte counters of the current attempt. `percent` is derived, never set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub percent: u8,
    pub received_bytes: u64,
    /// `0` when the size probe gave nothing usable.
    pub total_bytes: u64,
}

impl DownloadProgress {
    pub fn percent_of(received: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        let ratio = (received as f64 / total as f64) * 100.0;
        ratio.round().min(100.0) as u8
    }

    pub fn with_total(self, total_bytes: u64) -> Self {
        Self {
            percent: Self::percent_of(self.received_bytes, total_bytes),
            received_bytes: self.received_bytes,
            total_bytes,
        }
    }

    pub fn record_chunk(self, len: usize) -> Self {
        let received_bytes = self.received_bytes.saturating_add(len as u64);
        Self {
            percent: Self::percent_of(received_bytes, self.total_bytes),
            received_bytes,
            total_bytes: self.total_bytes,
        }
    }

    pub fn received_mb(&self) -> f64 {
        to_mb(self.received_bytes)
    }

    pub fn total_mb(&self) -> f64 {
        to_mb(self.total_bytes)
    }
}

fn to_mb(bytes: u64) -> f64 {
    ((bytes as f64 / BYTES_PER_MB) * 100.0).round() / 100.0
}

/// Latest observable value of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DownloadSnapshot {
    pub state: DownloadState,
    pub progress: DownloadProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub locator: String,
    pub file_name: String,
}

impl DownloadRequest {
    pub fn new(locator: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            file_name: file_name.into(),
        }
    }
}

/// Fully assembled payload of a finished transfer.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Bytes,
}

/// Ordered notifications emitted while a request is processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DownloadEvent {
    Started,
    TotalKnown { total_bytes: u64 },
    Progress(DownloadProgress),
    Completed { location: PathBuf },
    Failed { message: String },
    Cancelled,
    OpenRequested { file_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Completed { location: PathBuf, received_bytes: u64 },
    Opened,
    Ignored,
}
