use app_install_dl::{ActivityTicker, TickerConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;

fn config(seed: u64) -> TickerConfig {
    TickerConfig {
        seed,
        period: Duration::from_secs(3),
    }
}

#[tokio::test(start_paused = true)]
async fn counter_grows_once_per_period() {
    let seed = 58_200;
    let ticker = ActivityTicker::spawn_with_rng(config(seed), StdRng::seed_from_u64(42));
    let mut values = ticker.subscribe();
    let started = tokio::time::Instant::now();

    let mut previous = seed;
    for n in 1..=10u64 {
        values.changed().await.unwrap();
        let value = *values.borrow_and_update();
        assert!(value > previous);
        assert!(value >= seed + n && value <= seed + 3 * n);
        previous = value;
    }

    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(ticker.value(), previous);
}

#[tokio::test(start_paused = true)]
async fn nothing_fires_before_the_first_period() {
    let ticker = ActivityTicker::spawn_with_rng(config(7), StdRng::seed_from_u64(1));

    tokio::time::sleep(Duration::from_millis(2_900)).await;

    assert_eq!(ticker.value(), 7);
}

#[tokio::test(start_paused = true)]
async fn stop_halts_the_timer() {
    let ticker = ActivityTicker::spawn_with_rng(config(0), StdRng::seed_from_u64(9));
    let mut values = ticker.subscribe();
    values.changed().await.unwrap();

    let last = ticker.stop().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!((1..=3).contains(&last));
    assert_eq!(*values.borrow(), last);
    assert!(values.has_changed().is_err());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_ticker_stops_the_task() {
    let ticker = ActivityTicker::spawn(config(0));
    let mut values = ticker.subscribe();

    drop(ticker);

    // Sender side goes away once the task observes cancellation.
    assert!(values.changed().await.is_err());
    assert_eq!(*values.borrow(), 0);
}
