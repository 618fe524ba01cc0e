//! Stop command - stop the capture session or the daemon

use anyhow::Result;
use clap::Args;
use tasksnap_core::ipc::{self, IpcClient};

/// Arguments for the stop command
#[derive(Args)]
pub struct StopArgs {
    /// Only stop the capture session, keep the daemon running
    #[arg(short, long)]
    session: bool,
}

/// Stop the running session or daemon
pub async fn stop(args: StopArgs) -> Result<()> {
    if !ipc::daemon_running().await {
        println!("No tasksnap daemon is running.");
        return Ok(());
    }

    let mut client = IpcClient::connect().await?;
    if args.session {
        client.stop_session().await?;
        println!("Capture session stopped.");
    } else {
        client.shutdown().await?;
        println!("Tasksnap daemon is shutting down.");
    }

    Ok(())
}
