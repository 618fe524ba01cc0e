//! Tasksnap CLI
//!
//! Periodic screenshots of a shared screen while a task is in progress.
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon, uploading to a task-storage service
//! tasksnap watch --server https://tasks.example.com
//!
//! # Tell the daemon a task moved to "in progress"
//! tasksnap signal 65f1c0ffee
//!
//! # Stop the running capture session
//! tasksnap stop --session
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Tasksnap - screen-share screenshots for in-progress tasks
#[derive(Parser)]
#[command(name = "tasksnap")]
#[command(version)]
#[command(about = "Screen-share screenshots for in-progress tasks", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture daemon
    Watch(commands::WatchArgs),

    /// Send a task-state signal to the daemon
    Signal(commands::SignalArgs),

    /// Stop the capture session or the daemon
    Stop(commands::StopArgs),

    /// Show daemon and session status
    Status,

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["tasksnap", "tasksnap_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Watch(args) => commands::watch(args).await?,
        Commands::Signal(args) => commands::signal(args).await?,
        Commands::Stop(args) => commands::stop(args).await?,
        Commands::Status => commands::status().await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
