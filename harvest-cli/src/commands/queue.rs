//! Queue command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use harvest_core::domain::queue::{QueueHealth, QueueStatus};

use super::print_json;
use crate::config::Config;

/// Queue subcommands
#[derive(Subcommand)]
pub enum QueueCommands {
    /// Show queue health (all pipeline queues when no name is given)
    Health {
        /// Queue name (collection, transformation, processing, failed)
        name: Option<String>,
    },
}

/// Routes queue subcommands to their respective handlers
pub async fn handle_queue_command(command: QueueCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        QueueCommands::Health { name } => {
            let reports = match name {
                Some(name) => vec![client.queue_health(&name).await?],
                None => client.all_queue_health().await?,
            };

            if config.json {
                return print_json(&reports);
            }

            println!(
                "{:<16} {:<10} {:>8} {:>8} {:>10} {:>10} {:>7}",
                "QUEUE".bold(),
                "STATUS".bold(),
                "DEPTH".bold(),
                "MAX".bold(),
                "RATE/s".bold(),
                "AVG ms".bold(),
                "ERRORS".bold()
            );
            for report in &reports {
                print_health_row(report);
            }
            Ok(())
        }
    }
}

fn print_health_row(health: &QueueHealth) {
    // Pad before colouring so escape codes do not break alignment
    let status = format!("{:<10}", health.status.to_string());
    let status = match health.status {
        QueueStatus::Healthy => status.green(),
        QueueStatus::Warning => status.yellow(),
        QueueStatus::Critical => status.red().bold(),
    };
    let errors = if health.error_count > 0 {
        health.error_count.to_string().red()
    } else {
        health.error_count.to_string().normal()
    };

    println!(
        "{:<16} {} {:>8} {:>8} {:>10.2} {:>10.1} {:>7}",
        health.queue_name,
        status,
        health.current_depth,
        health.max_depth,
        health.processing_rate,
        health.average_processing_time,
        errors
    );
}
