use anyhow::{Context, Result};
use app_install_dl::cli::Args;
use app_install_dl::ticker::format_count;
use app_install_dl::{
    ActivityTicker, DownloadController, DownloadError, DownloadEvent, DownloadProgress,
    DownloadRequest, DownloadState, FileSink, HttpSource, StartOutcome,
};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_label(progress: &DownloadProgress) -> String {
    if progress.total_bytes > 0 {
        format!(
            "{}% • {:.1}/{}MB",
            progress.percent,
            progress.received_mb(),
            progress.total_mb()
        )
    } else {
        format!("{:.1}MB", progress.received_mb())
    }
}

fn set_action(pb: &ProgressBar, file_name: &str, state: DownloadState) {
    pb.set_prefix(format!("{} [{}]", file_name, state.action_label()));
}

async fn render_download(
    mut events: broadcast::Receiver<DownloadEvent>,
    pb: ProgressBar,
    file_name: String,
) {
    set_action(&pb, &file_name, DownloadState::Idle);
    loop {
        match events.recv().await {
            Ok(DownloadEvent::Started) => {
                pb.set_position(0);
                pb.set_message("");
                set_action(&pb, &file_name, DownloadState::Downloading);
            }
            Ok(DownloadEvent::TotalKnown { .. }) => {}
            Ok(DownloadEvent::Progress(progress)) => {
                pb.set_position(progress.percent as u64);
                pb.set_message(progress_label(&progress));
            }
            Ok(DownloadEvent::Completed { location }) => {
                pb.set_position(100);
                pb.set_message(format!("Saved to {}", location.display()));
                set_action(&pb, &file_name, DownloadState::Completed);
            }
            Ok(DownloadEvent::Failed { message }) => {
                pb.set_message(message);
                set_action(&pb, &file_name, DownloadState::Idle);
            }
            Ok(DownloadEvent::Cancelled) => {
                pb.set_message("Cancelled");
                set_action(&pb, &file_name, DownloadState::Idle);
            }
            Ok(DownloadEvent::OpenRequested { file_name }) => {
                pb.println(format!("Opening {} ...", file_name));
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn render_counter(mut counter: watch::Receiver<u64>, pb: ProgressBar) {
    loop {
        let value = *counter.borrow_and_update();
        pb.set_message(format!("{} Downloads", format_count(value)));
        if counter.changed().await.is_err() {
            break;
        }
    }
}

async fn install_with_retry(
    controller: &DownloadController,
    request: &DownloadRequest,
    retries: u32,
    pb: &ProgressBar,
) -> std::result::Result<StartOutcome, DownloadError> {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match controller.start(request).await {
            Ok(outcome) => return Ok(outcome),
            Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
            Err(e) if attempt <= retries => {
                // Exponential backoff: 1s, 2s, 4s... capped at 30s
                let delay_ms = (1000u64 << (attempt - 1).min(5)).min(30_000);
                pb.set_message(format!(
                    "[Retry {}/{}: {}s wait...] {}",
                    attempt,
                    retries,
                    delay_ms / 1000,
                    e
                ));
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let mut builder = HttpSource::builder();
    if let Some(base_url) = args.base_url.clone() {
        builder = builder.base_url(base_url);
    }
    if let Some(proxy) = &args.proxy {
        builder = builder.proxy(proxy.clone());
    }
    let source = builder.build().context("Failed to build HTTP client")?;

    let controller = DownloadController::new(
        Arc::new(source),
        Arc::new(FileSink::new(&args.output)),
        args.download_config(),
    );
    let request = DownloadRequest::new(args.url.clone(), args.file_name());

    let mp = MultiProgress::new();

    let counter_pb = mp.add(ProgressBar::new_spinner());
    counter_pb.set_style(ProgressStyle::default_spinner().template("{msg}").unwrap());
    let ticker = ActivityTicker::spawn(args.ticker_config());
    let counter_task = tokio::spawn(render_counter(ticker.subscribe(), counter_pb.clone()));

    let pb = mp.add(ProgressBar::new(100));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} {bar:40} {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );
    let render_task = tokio::spawn(render_download(
        controller.subscribe(),
        pb.clone(),
        request.file_name.clone(),
    ));

    let cancel_on_ctrl_c = {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                controller.cancel();
            }
        })
    };

    let outcome = install_with_retry(&controller, &request, args.retries, &pb).await;

    if args.open && outcome.is_ok() {
        // A completed slot turns the install action into "open".
        controller.start(&request).await?;
    }

    cancel_on_ctrl_c.abort();
    let _ = cancel_on_ctrl_c.await;
    let snapshot = controller.snapshot();
    // Last handle gone closes the event channel, so the renderer drains and exits.
    drop(controller);
    let _ = render_task.await;
    let counter = ticker.stop().await;
    counter_task.abort();
    pb.finish();
    counter_pb.finish_with_message(format!("{} Downloads", format_count(counter)));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return outcome.map(|_| ()).context("Install failed");
    }

    match outcome {
        Ok(StartOutcome::Completed {
            location,
            received_bytes,
        }) => {
            println!("\nDone: {} ({} bytes)", location.display(), received_bytes);
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) => {
            println!("\n{}", e.user_message());
            Err(e).context("Install failed")
        }
    }
}
