use std::time::Duration;
use thiserror::Error;

pub const FAILURE_NOTICE: &str = "Download failed. Please try again.";

#[derive(Error, Debug)]
pub enum DownloadError {
    /// Size probe failed or returned no usable length. Absorbed by the
    /// controller, which continues with an unknown total.
    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("HTTP request failed: {0}")]
    Status(reqwest::StatusCode),

    #[error("Size mismatch: expected {expected} bytes, got {received} bytes")]
    SizeMismatch { expected: u64, received: u64 },

    #[error("Download cancelled")]
    Cancelled,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to deliver artifact: {0}")]
    Delivery(#[from] std::io::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid locator: {0}")]
    InvalidLocator(String),
}

impl DownloadError {
    pub fn is_absorbable(&self) -> bool {
        matches!(self, DownloadError::MetadataUnavailable(_))
    }

    /// Text surfaced to the user when an attempt ends in failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            DownloadError::Cancelled => "Download cancelled.",
            _ => FAILURE_NOTICE,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
