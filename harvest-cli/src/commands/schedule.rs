//! Schedule command handlers
//!
//! Handles creation, listing, viewing and deletion of schedules, and
//! attaching sitemaps to an existing schedule.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use harvest_client::OrchestratorClient;
use harvest_core::domain::schedule::{Schedule, Sitemap};
use harvest_core::dto::schedule::{CreateSchedule, CreateSitemap};

use super::print_json;
use crate::config::Config;
use crate::id_resolver::resolve_schedule_id;
use crate::types::IdOrPrefix;

/// Schedule subcommands
#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// Create a new schedule
    Create {
        /// Schedule name
        #[arg(short, long)]
        name: String,

        /// Source identifier (e.g. the site being collected)
        #[arg(long)]
        source: String,

        /// SKU selecting the collector/transformer pair
        #[arg(long)]
        sku: String,

        /// Cron expression (5 or 6 fields); omit to run once
        #[arg(short, long)]
        cron: Option<String>,

        /// Sitemap URL (repeatable)
        #[arg(short, long = "sitemap")]
        sitemaps: Vec<String>,

        /// Regex applied to the URLs of every sitemap given here
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// List all schedules
    List,
    /// Get schedule details
    Get {
        /// Schedule ID or unambiguous prefix
        id: String,
    },
    /// Delete a schedule and its sitemaps
    Delete {
        /// Schedule ID or unambiguous prefix
        id: String,
    },
    /// Attach a sitemap to a schedule
    AddSitemap {
        /// Schedule ID or unambiguous prefix
        id: String,

        /// Sitemap URL
        url: String,

        /// Regex applied to the sitemap's URLs
        #[arg(short, long)]
        filter: Option<String>,
    },
}

/// Routes schedule subcommands to their respective handlers
pub async fn handle_schedule_command(command: ScheduleCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ScheduleCommands::Create {
            name,
            source,
            sku,
            cron,
            sitemaps,
            filter,
        } => {
            let req = CreateSchedule {
                source,
                sku,
                name,
                cron_expression: cron,
                sitemaps: sitemaps
                    .into_iter()
                    .map(|url| CreateSitemap {
                        url,
                        regex_filter: filter.clone(),
                    })
                    .collect(),
            };
            create_schedule(&client, req, config.json).await
        }
        ScheduleCommands::List => list_schedules(&client, config.json).await,
        ScheduleCommands::Get { id } => get_schedule(&client, &id, config.json).await,
        ScheduleCommands::Delete { id } => delete_schedule(&client, &id).await,
        ScheduleCommands::AddSitemap { id, url, filter } => {
            add_sitemap(&client, &id, url, filter, config.json).await
        }
    }
}

async fn create_schedule(client: &OrchestratorClient, req: CreateSchedule, json: bool) -> Result<()> {
    if req.sitemaps.is_empty() {
        println!(
            "{}",
            "⚠ No sitemaps given; add one with `harvest schedule add-sitemap`".yellow()
        );
    }

    let schedule = client.create_schedule(req).await?;

    if json {
        return print_json(&schedule);
    }

    println!("{}", "✓ Schedule created successfully!".green().bold());
    println!();
    print_schedule_details(&schedule);
    Ok(())
}

async fn list_schedules(client: &OrchestratorClient, json: bool) -> Result<()> {
    let schedules = client.list_schedules().await?;

    if json {
        return print_json(&schedules);
    }

    if schedules.is_empty() {
        println!("{}", "No schedules found.".yellow());
    } else {
        println!("{}", format!("Found {} schedule(s):", schedules.len()).bold());
        println!();
        for schedule in &schedules {
            print_schedule_summary(schedule);
        }
    }

    Ok(())
}

async fn get_schedule(client: &OrchestratorClient, id: &str, json: bool) -> Result<()> {
    let uuid = resolve_schedule_id(client, &IdOrPrefix::parse(id)).await?;
    let schedule = client.get_schedule(uuid).await?;

    if json {
        return print_json(&schedule);
    }

    print_schedule_details(&schedule);
    Ok(())
}

async fn delete_schedule(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_schedule_id(client, &IdOrPrefix::parse(id)).await?;
    client.delete_schedule(uuid).await?;

    println!(
        "{}",
        format!("✓ Schedule {} deleted", uuid).green().bold()
    );
    Ok(())
}

async fn add_sitemap(
    client: &OrchestratorClient,
    id: &str,
    url: String,
    filter: Option<String>,
    json: bool,
) -> Result<()> {
    let uuid = resolve_schedule_id(client, &IdOrPrefix::parse(id)).await?;
    let sitemap = client
        .add_sitemap(
            uuid,
            CreateSitemap {
                url,
                regex_filter: filter,
            },
        )
        .await?;

    if json {
        return print_json(&sitemap);
    }

    println!("{}", "✓ Sitemap added".green().bold());
    print_sitemap(&sitemap);
    Ok(())
}

fn print_schedule_summary(schedule: &Schedule) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        schedule.name.bold(),
        schedule.id.to_string().dimmed()
    );
    println!("    SKU:      {} ({})", schedule.sku, schedule.source.dimmed());
    println!("    Cron:     {}", cron_label(schedule));
    println!("    Status:   {}", active_label(schedule.is_active));
    if let Some(next) = schedule.next_execution {
        println!(
            "    Next run: {}",
            next.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    println!();
}

fn print_schedule_details(schedule: &Schedule) {
    println!("{}", "Schedule Details:".bold());
    println!("  ID:            {}", schedule.id.to_string().cyan());
    println!("  Name:          {}", schedule.name);
    println!("  Source:        {}", schedule.source);
    println!("  SKU:           {}", schedule.sku);
    println!("  Cron:          {}", cron_label(schedule));
    println!("  Status:        {}", active_label(schedule.is_active));
    println!(
        "  Created:       {}",
        schedule.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    match schedule.next_execution {
        Some(next) => println!("  Next run:      {}", next.format("%Y-%m-%d %H:%M:%S")),
        None => println!("  Next run:      {}", "none".dimmed()),
    }
    if let Some(last) = schedule.last_executed {
        println!("  Last run:      {}", last.format("%Y-%m-%d %H:%M:%S"));
    }

    println!("\n{}", format!("Sitemaps ({}):", schedule.sitemaps.len()).bold());
    if schedule.sitemaps.is_empty() {
        println!("  {}", "none".dimmed());
    }
    for sitemap in &schedule.sitemaps {
        print_sitemap(sitemap);
    }
}

fn print_sitemap(sitemap: &Sitemap) {
    let marker = if sitemap.is_active {
        "●".green()
    } else {
        "○".dimmed()
    };
    println!("  {} {}", marker, sitemap.url);
    if let Some(filter) = &sitemap.regex_filter {
        println!("      filter: {}", filter.cyan());
    }
}

fn cron_label(schedule: &Schedule) -> ColoredString {
    match &schedule.cron_expression {
        Some(cron) => cron.as_str().normal(),
        None => "once".italic(),
    }
}

fn active_label(is_active: bool) -> ColoredString {
    if is_active {
        "active".green()
    } else {
        "inactive".dimmed()
    }
}
