//! Watch command - run the capture daemon

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tasksnap_core::{
    capture::{CaptureType, PortalCapture},
    config::{CaptureConfig, ConfigFile},
    ipc::{self, IpcServer},
    session::SessionController,
    types::{SessionState, TaskId},
    upload::store_from_config,
};
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use super::report;

/// Arguments for the watch command
#[derive(Args)]
pub struct WatchArgs {
    /// Start capturing this task right away
    #[arg(short, long)]
    task: Option<TaskId>,

    /// Seconds between screenshots
    #[arg(short, long)]
    interval: Option<u64>,

    /// Task-storage service URL
    #[arg(short, long)]
    server: Option<String>,

    /// Write screenshots to this directory instead of uploading
    #[arg(short, long, conflicts_with = "server")]
    output_dir: Option<PathBuf>,

    /// Offer windows instead of monitors in the picker
    #[arg(long, conflicts_with = "both")]
    window: bool,

    /// Offer both monitors and windows in the picker
    #[arg(long)]
    both: bool,
}

fn build_config(args: &WatchArgs) -> Result<CaptureConfig> {
    let mut config = ConfigFile::load()
        .context("Failed to load config file")?
        .apply_env()
        .to_capture_config()?;

    if let Some(secs) = args.interval {
        config = config.with_interval(Duration::from_secs(secs));
    }
    if let Some(server) = &args.server {
        config.upload.server_url = Some(server.clone());
        config.upload.output_dir = None;
    }
    if let Some(dir) = &args.output_dir {
        config.upload.output_dir = Some(dir.clone());
        config.upload.server_url = None;
    }
    if args.window {
        config = config.with_source(CaptureType::Window);
    } else if args.both {
        config = config.with_source(CaptureType::Both);
    }

    Ok(config)
}

/// Print state transitions as they happen
async fn report_states(mut rx: watch::Receiver<SessionState>) {
    while rx.changed().await.is_ok() {
        let state = *rx.borrow_and_update();
        match state {
            SessionState::Requesting => {
                println!("Waiting for screen selection (a dialog should appear)...")
            }
            SessionState::Active => println!("Capturing."),
            SessionState::Stopped => println!("Capture stopped. Waiting for the next task."),
            SessionState::Idle => println!("Capture not started. Waiting for the next task."),
        }
    }
}

/// Run the daemon until Ctrl+C or a shutdown request
pub async fn watch(args: WatchArgs) -> Result<()> {
    println!("Tasksnap - Watching\n");

    let config = build_config(&args)?;
    if let Err(e) = config.validate_strict() {
        bail!("Invalid configuration: {}", e);
    }
    for warning in config.validate() {
        println!("Warning: {}", warning);
    }

    if ipc::daemon_running().await {
        bail!("A tasksnap daemon is already running");
    }

    println!("Configuration:");
    println!("  Interval:    {}s", config.interval.as_secs_f64());
    println!("  Source:      {:?}", config.source);
    match (&config.upload.server_url, &config.upload.output_dir) {
        (Some(url), _) => println!("  Server:      {}", url),
        (None, Some(dir)) => println!("  Directory:   {}", dir.display()),
        (None, None) => {}
    }
    println!();

    let store = store_from_config(&config.upload)?;
    let source = PortalCapture::new(config.source, config.cursor_mode)
        .await
        .context("Failed to connect to the screen-cast portal")?;
    let controller = Arc::new(SessionController::new(Arc::new(source), store, config));

    let mut server = IpcServer::new(controller.clone());
    server.start().await?;
    println!("Listening on {}", server.path().display());

    tokio::spawn(report_states(controller.subscribe()));

    if let Some(task_id) = args.task {
        info!("Starting capture for task {}", task_id);
        if let Err(e) = controller.start(task_id).await {
            report(&e);
        }
    }

    println!("Press Ctrl+C to stop...\n");

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            println!("\nReceived interrupt signal...");
        }
        _ = async {
            while let Ok(true) = server.accept_one().await {}
        } => {
            info!("Shutdown requested over IPC");
        }
    }

    controller.stop().await?;
    if let Some(stats) = controller.stats() {
        println!("{}", stats);
    }
    println!("Tasksnap stopped.");

    Ok(())
}
