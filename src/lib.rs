//! Install-button download core: a single-slot download controller with
//! observable progress, and a cosmetic activity counter ticking beside it.

pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod models;
pub mod sink;
pub mod source;
pub mod state;
pub mod ticker;

pub use config::DownloadConfig;
pub use downloader::DownloadController;
pub use error::DownloadError;
pub use models::{
    Artifact, DownloadEvent, DownloadProgress, DownloadRequest, DownloadSnapshot, DownloadState,
    StartOutcome,
};
pub use sink::{ArtifactSink, FileSink};
pub use source::{ArtifactSource, ChunkStream, HttpSource};
pub use ticker::{ActivityCounter, ActivityTicker, TickerConfig};
