//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod queue;
mod schedule;

pub use job::JobCommands;
pub use queue::QueueCommands;
pub use schedule::ScheduleCommands;

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Schedule management
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Job (execution) management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Pipeline queue inspection
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Schedule { command } => schedule::handle_schedule_command(command, config).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Queue { command } => queue::handle_queue_command(command, config).await,
    }
}

/// Prints `value` as pretty JSON
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
