use crate::config::DownloadConfig;
use crate::sink::FALLBACK_FILE_NAME;
use crate::ticker::TickerConfig;
use clap::Parser;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "app-install-dl")]
#[command(author, version, about = "Install an app package with live progress", long_about = None)]
pub struct Args {
    /// Package to install: an absolute URL, or a path resolved against --base-url
    #[arg(env = "APP_DL_URL")]
    pub url: String,

    /// Base URL for relative package paths (e.g. http://localhost:5173)
    #[arg(long, env = "APP_DL_BASE_URL")]
    pub base_url: Option<Url>,

    /// Output directory
    #[arg(short, long, env = "APP_DL_OUTPUT", default_value = "./my_downloads")]
    pub output: String,

    /// File name to save as (default: last path segment of the URL)
    #[arg(short = 'f', long, env = "APP_DL_FILE_NAME")]
    pub file_name: Option<String>,

    /// Delay after each progress step, in milliseconds (0 disables pacing)
    #[arg(long, env = "APP_DL_PACE_MS", default_value = "0")]
    pub pace_ms: u64,

    /// Largest progress step in bytes
    #[arg(long, env = "APP_DL_CHUNK_SIZE")]
    pub chunk_size: Option<usize>,

    /// Timeout in seconds for the size probe, the request and each chunk read
    #[arg(long, env = "APP_DL_TIMEOUT")]
    pub timeout: Option<u64>,

    /// HTTP proxy (e.g., http://127.0.0.1:7890)
    #[arg(long, env = "APP_DL_PROXY")]
    pub proxy: Option<String>,

    /// Number of retry attempts after a failed download
    #[arg(short, long, env = "APP_DL_RETRIES", default_value = "0")]
    pub retries: u32,

    /// Press "Open" once the download completes
    #[arg(long)]
    pub open: bool,

    /// Print the final snapshot as JSON
    #[arg(long)]
    pub json: bool,

    /// Starting value of the download counter
    #[arg(long, env = "APP_DL_COUNTER_SEED", default_value = "0")]
    pub counter_seed: u64,

    /// Download counter period in milliseconds
    #[arg(long, env = "APP_DL_COUNTER_PERIOD_MS", default_value = "3000")]
    pub counter_period_ms: u64,
}

impl Args {
    pub fn file_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| file_name_from_locator(&self.url))
    }

    pub fn download_config(&self) -> DownloadConfig {
        let mut config = DownloadConfig::default().with_pace(Duration::from_millis(self.pace_ms));
        if let Some(chunk_size) = self.chunk_size {
            config = config.with_max_chunk_bytes(chunk_size);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config
    }

    pub fn ticker_config(&self) -> TickerConfig {
        TickerConfig {
            seed: self.counter_seed,
            period: Duration::from_millis(self.counter_period_ms),
        }
    }
}

/// Last non-empty path segment, ignoring query and fragment.
pub fn file_name_from_locator(locator: &str) -> String {
    let path = locator
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    path.rsplit('/')
        .find(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}
