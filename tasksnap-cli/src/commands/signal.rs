//! Signal command - report a task-state change to the daemon

use anyhow::Result;
use clap::Args;
use tasksnap_core::{
    ipc::{IpcClient, IpcResponse},
    types::{TaskId, TaskSignal, TaskStage},
};

/// Arguments for the signal command
#[derive(Args)]
pub struct SignalArgs {
    /// Task identifier
    task_id: TaskId,

    /// Stage the task moved to (todo, in-progress, completed)
    #[arg(short, long, default_value = "in-progress")]
    stage: TaskStage,
}

/// Send a task-state signal
pub async fn signal(args: SignalArgs) -> Result<()> {
    let mut client = IpcClient::connect().await?;
    let task_id = args.task_id.clone();

    let response = client
        .signal(TaskSignal {
            task_id: args.task_id,
            stage: args.stage,
        })
        .await?;

    match response {
        IpcResponse::Started {
            handle,
            task_id,
            width,
            height,
        } => println!(
            "Capturing task {} ({}x{}, session {})",
            task_id, width, height, handle
        ),
        _ => println!("Task {} is now {}", task_id, args.stage),
    }

    Ok(())
}
