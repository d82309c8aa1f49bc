// Gavel auction client entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, not terminal)
// 2. Load config
// 3. Create channels
// 4. Spawn the push channel task
// 5. Spawn the initial snapshot / clock sync task
// 6. Spawn the app event loop
// 7. Run the console until the user quits
// 8. Cleanup on exit

mod console;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use directories::ProjectDirs;
use tokio::sync::mpsc;
use tracing::{error, info};

use gavel_app::app::{self, AppState};
use gavel_app::http::HttpSnapshotSource;
use gavel_app::sync::spawn_initial_sync;
use gavel_core::clock::{ClockSynchronizer, SystemClock};
use gavel_core::config;
use gavel_core::ws_client;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    let log_path = init_tracing()?;
    info!("Gavel client starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: http={}, ws={}, increment={}",
        config.server.http_url, config.server.ws_url, config.bidding.increment
    );

    // 3. Create channels
    let (channel_tx, channel_rx) = mpsc::channel(256);
    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let (timer_tx, timer_rx) = mpsc::channel(256);
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, ui_rx) = mpsc::channel(256);

    // 4. Push channel
    let ws_url = config.server.ws_url.clone();
    let reconnect_delay = config.timing.reconnect_delay();
    let ws_handle = tokio::spawn(async move {
        if let Err(e) = ws_client::run(ws_url, reconnect_delay, channel_tx, outbound_rx).await {
            error!("Channel task error: {e:#}");
            eprintln!("gavel: push channel stopped: {e:#}");
        }
    });

    // 5. Snapshot + clock offset, retried until it succeeds
    let source = HttpSnapshotSource::new(&config.server.http_url);
    info!("Snapshot source: {}", source.url());
    let synchronizer = ClockSynchronizer::new(source, Arc::new(SystemClock));
    let (snapshot_rx, sync_handle) =
        spawn_initial_sync(synchronizer, config.timing.snapshot_retry());

    // 6. App loop
    let state = AppState::new(config.clone(), Arc::new(SystemClock), timer_tx);
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(
            channel_rx,
            snapshot_rx,
            timer_rx,
            cmd_rx,
            outbound_tx,
            ui_tx,
            state,
        )
        .await
        {
            error!("Application loop error: {e}");
        }
    });

    // 7. Console (blocks until quit)
    println!(
        "gavel: connecting to {} (log: {})",
        config.server.ws_url,
        log_path.display()
    );
    if let Err(e) = console::run(ui_rx, cmd_tx).await {
        error!("Console error: {e}");
    }

    // 8. Cleanup: let the app loop wind down, then stop background tasks
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;
    sync_handle.abort();
    ws_handle.abort();

    info!("Gavel client shut down cleanly");
    Ok(())
}

/// Log directory: the platform data-local dir, or `./logs` when there is none.
fn log_dir() -> anyhow::Result<PathBuf> {
    match ProjectDirs::from("", "", "gavel") {
        Some(dirs) => Ok(dirs.data_local_dir().join("logs")),
        None => Ok(std::env::current_dir()?.join("logs")),
    }
}

/// Initialize tracing to log to a file (the terminal belongs to the console).
fn init_tracing() -> anyhow::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let log_path = log_dir.join("gavel.log");
    let log_file = std::fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file {}", log_path.display()))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gavel=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(log_path)
}
