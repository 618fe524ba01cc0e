//! Status command - show daemon and session status

use anyhow::Result;
use tasksnap_core::ipc::{self, IpcClient};

/// Show status of the running daemon
pub async fn status() -> Result<()> {
    println!("Tasksnap - Status\n");

    if !ipc::daemon_running().await {
        println!("  Daemon: not running");
        println!();
        println!("Start it with: tasksnap watch");
        return Ok(());
    }

    let mut client = IpcClient::connect().await?;
    let status = client.status().await?;

    println!("  Daemon:   running (pid {})", status.pid);
    println!("  Uptime:   {:.0}s", status.uptime_seconds);
    println!("  State:    {}", status.state);
    println!("  Interval: {}ms", status.interval_ms);
    if let Some(dest) = &status.destination {
        println!("  Uploads:  {}", dest);
    }
    if let Some(task) = &status.task_id {
        println!("  Task:     {}", task);
    }

    if let Ok(stats) = client.stats().await {
        println!();
        println!("Session {} ({:.1}s):", stats.handle, stats.elapsed_seconds);
        println!(
            "  Ticks:    {} ({} captured, {} skipped)",
            stats.ticks, stats.captured, stats.skipped
        );
        println!(
            "  Uploads:  {} ok, {} failed, {} in flight",
            stats.uploaded, stats.failed, stats.in_flight
        );
    }

    Ok(())
}
