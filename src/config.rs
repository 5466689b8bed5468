use std::time::Duration;

/// Tunables of the transfer loop.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Delay after each progress event. Off by default.
    pub pace: Option<Duration>,
    /// Upper bound for a single progress step; larger buffers are re-sliced.
    pub max_chunk_bytes: Option<usize>,
    /// Applied to the probe, the stream open and every chunk read.
    pub timeout: Option<Duration>,
    pub event_capacity: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            pace: None,
            max_chunk_bytes: None,
            timeout: None,
            event_capacity: 1024,
        }
    }
}

impl DownloadConfig {
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = (!pace.is_zero()).then_some(pace);
        self
    }

    pub fn with_max_chunk_bytes(mut self, max: usize) -> Self {
        self.max_chunk_bytes = (max > 0).then_some(max);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
