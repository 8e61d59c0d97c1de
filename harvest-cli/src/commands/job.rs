//! Job command handlers
//!
//! A job is one execution of a schedule. Handles manual triggering,
//! viewing a single execution and listing a schedule's history.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use harvest_client::OrchestratorClient;
use harvest_core::domain::execution::{Execution, ExecutionStatus};
use harvest_core::dto::job::CreateJob;

use super::print_json;
use crate::config::Config;
use crate::id_resolver::{resolve_job_id, resolve_schedule_id};
use crate::types::IdOrPrefix;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Run a schedule now and seed its pipeline contexts
    Create {
        /// Schedule ID or unambiguous prefix
        schedule_id: String,
    },
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// List jobs for a schedule, newest first
    List {
        /// Schedule ID or unambiguous prefix
        schedule_id: String,
    },
}

/// Routes job subcommands to their respective handlers
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        JobCommands::Create { schedule_id } => create_job(&client, &schedule_id, config.json).await,
        JobCommands::Get { id } => get_job(&client, &id, config.json).await,
        JobCommands::List { schedule_id } => list_jobs(&client, &schedule_id, config.json).await,
    }
}

async fn create_job(client: &OrchestratorClient, schedule_id: &str, json: bool) -> Result<()> {
    let schedule_id = resolve_schedule_id(client, &IdOrPrefix::parse(schedule_id)).await?;
    let launched = client.create_job(CreateJob { schedule_id }).await?;

    if json {
        return print_json(&launched);
    }

    if launched.execution.status == ExecutionStatus::Failed {
        println!("{}", "✗ Job created but seeding failed".red().bold());
    } else {
        println!(
            "{}",
            format!("✓ Job launched, {} context(s) seeded", launched.seeded)
                .green()
                .bold()
        );
    }
    println!();
    print_job_details(&launched.execution);
    Ok(())
}

async fn get_job(client: &OrchestratorClient, id: &str, json: bool) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;
    let job = client.get_job(uuid).await?;

    if json {
        return print_json(&job);
    }

    print_job_details(&job);
    Ok(())
}

async fn list_jobs(client: &OrchestratorClient, schedule_id: &str, json: bool) -> Result<()> {
    let schedule_id = resolve_schedule_id(client, &IdOrPrefix::parse(schedule_id)).await?;
    let jobs = client.list_jobs_by_schedule(schedule_id).await?;

    if json {
        return print_json(&jobs);
    }

    if jobs.is_empty() {
        println!(
            "{}",
            format!("No jobs found for schedule {}.", schedule_id).yellow()
        );
    } else {
        println!(
            "{}",
            format!("Found {} job(s) for schedule {}:", jobs.len(), schedule_id).bold()
        );
        println!();
        for job in &jobs {
            print_job_summary(job);
        }
    }

    Ok(())
}

fn print_job_summary(job: &Execution) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Status:   {}", colorize_status(job.status));
    println!(
        "    Started:  {}",
        job.started_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(seeded) = job.seeded_count {
        println!("    Seeded:   {}", seeded);
    }
    println!();
}

fn print_job_details(job: &Execution) {
    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.to_string().cyan());
    println!("  Schedule ID: {}", job.schedule_id.to_string().dimmed());
    println!("  Status:      {}", colorize_status(job.status));
    println!("  Started:     {}", job.started_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(completed) = job.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));
        let millis = completed
            .signed_duration_since(job.started_at)
            .num_milliseconds();
        println!("  Duration:    {}ms", millis);
    }

    if let Some(seeded) = job.seeded_count {
        println!("  Seeded:      {}", seeded);
    }

    if let Some(error) = &job.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn colorize_status(status: ExecutionStatus) -> ColoredString {
    match status {
        ExecutionStatus::Created => status.as_str().yellow(),
        ExecutionStatus::Executed => status.as_str().green(),
        ExecutionStatus::Failed => status.as_str().red(),
    }
}
