use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(3);

/// Cosmetic download counter. Unrelated to any real transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityCounter {
    value: u64,
}

impl ActivityCounter {
    pub fn new(seed: u64) -> Self {
        Self { value: seed }
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    /// Adds a uniform draw from `1..=3` and returns the new value.
    pub fn tick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> u64 {
        let step: u64 = rng.gen_range(1..=3);
        self.value = self.value.saturating_add(step);
        self.value
    }
}

#[derive(Debug, Clone)]
pub struct TickerConfig {
    pub seed: u64,
    pub period: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            period: DEFAULT_TICK_PERIOD,
        }
    }
}

/// Background task bumping an [`ActivityCounter`] every period.
///
/// Stops on [`ActivityTicker::stop`] or when dropped.
pub struct ActivityTicker {
    value: watch::Receiver<u64>,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ActivityTicker {
    pub fn spawn(config: TickerConfig) -> Self {
        Self::spawn_with_rng(config, StdRng::from_entropy())
    }

    pub fn spawn_with_rng<R: Rng + Send + 'static>(config: TickerConfig, mut rng: R) -> Self {
        let (tx, value) = watch::channel(config.seed);
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let period = config.period.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut counter = ActivityCounter::new(config.seed);
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let value = counter.tick(&mut rng);
                        trace!(value, "activity counter ticked");
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                }
            }
            debug!(value = counter.value(), "activity ticker stopped");
        });

        Self {
            value,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn value(&self) -> u64 {
        *self.value.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.value.clone()
    }

    /// Cancels the timer and waits for the task to exit.
    pub async fn stop(mut self) -> u64 {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.value()
    }
}

impl Drop for ActivityTicker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Compact store-style rendering: `950`, `58.2K+`, `1.3M+`.
pub fn format_count(value: u64) -> String {
    match value {
        0..=999 => value.to_string(),
        1_000..=999_999 => format!("{:.1}K+", value as f64 / 1_000.0),
        _ => format!("{:.1}M+", value as f64 / 1_000_000.0),
    }
}
