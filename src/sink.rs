use crate::error::Result;
use crate::models::Artifact;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

pub const FALLBACK_FILE_NAME: &str = "download.bin";

/// Host-side save facility that receives finished artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Stores the artifact and returns where it ended up.
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf>;
}

/// Saves artifacts into a directory, going through a `.part` file so a
/// failed write never leaves a half-written artifact under the final name.
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ArtifactSink for FileSink {
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).await?;

        let output_path = self.output_dir.join(safe_file_name(&artifact.file_name));
        let part = PartFile::new(format!("{}.part", output_path.display()));

        fs::write(&part.path, &artifact.bytes).await?;
        fs::rename(&part.path, &output_path).await?;
        part.persisted();

        info!(path = %output_path.display(), bytes = artifact.bytes.len(), "artifact saved");
        Ok(output_path)
    }
}

/// Removes the `.part` file unless it was renamed into place. Also covers a
/// `deliver` future dropped mid-write.
struct PartFile {
    path: PathBuf,
    keep: bool,
}

impl PartFile {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }

    fn persisted(mut self) {
        self.keep = true;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Keeps only the final path component of a suggested name.
pub fn safe_file_name(suggested: &str) -> String {
    Path::new(suggested.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_FILE_NAME)
        .to_string()
}
