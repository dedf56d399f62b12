//! Mailroom CLI: recipient import tooling, directory lookup and an
//! end-to-end simulated mail job.
//!
//! Configuration comes from the environment (see `Config::from_env`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mailroom_cli::{init_tracing, load_directory, simulate, truncate_cell, SimulationOptions};
use mailroom_core::models::CarrierService;
use mailroom_core::{AppResult, Config, ErrorMetadata};
use mailroom_services::{import_template, RecipientImporter};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "mailroom", about = "Outbound mail job workflow")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the recipient import template
    Template,
    /// Check a recipient import file without adding it to a job
    Import {
        /// CSV file laid out like the template
        file: PathBuf,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recipient directory operations
    Directory {
        #[command(subcommand)]
        sub: DirectoryCommands,
    },
    /// Run a simulated job through every stage and print its tracking report
    Simulate {
        /// Number of recipients
        #[arg(long, default_value = "5")]
        recipients: usize,
        /// Carrier: usps, fedex or ups
        #[arg(long, default_value = "usps")]
        carrier: CarrierService,
        /// Seed for reproducible carrier behaviour
        #[arg(long)]
        seed: Option<u64>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DirectoryCommands {
    /// Search contacts by name, e-mail or organization
    Search {
        /// Search text; empty lists everything
        query: String,
        /// Directory seed file (JSON); the bundled directory when absent
        #[arg(long)]
        seed: Option<PathBuf>,
    },
}

fn print_json(value: &impl Serialize) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::debug!(error = %e.detailed_message(), "Command failed");
        eprintln!("error: {}", e.client_message());
        if let Some(action) = e.suggested_action() {
            eprintln!("hint: {}", action);
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let config = Config::from_env()?;
    config.validate()?;

    match cli.command {
        Commands::Template => print!("{}", import_template()),
        Commands::Import { file, json } => {
            let input = std::fs::File::open(&file)?;
            let report = RecipientImporter::new(config.default_delivery_type).parse(input)?;
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "{} row(s): {} accepted, {} rejected",
                    report.total_rows(),
                    report.accepted.len(),
                    report.rejected.len()
                );
                for row in &report.accepted {
                    println!(
                        "  line {:>4}  ok   {:<24} {}",
                        row.line,
                        truncate_cell(&row.recipient.name, 24),
                        row.recipient.address
                    );
                }
                for row in &report.rejected {
                    println!("  line {:>4}  err  {}", row.line, row.message);
                }
            }
        }
        Commands::Directory { sub } => match sub {
            DirectoryCommands::Search { query, seed } => {
                let directory = load_directory(seed.as_deref())?;
                let matches = directory.search(&query).await;
                if matches.is_empty() {
                    println!("No contacts match '{}'", query);
                }
                for hit in matches {
                    println!(
                        "{}  {:<20} {:<28} {}",
                        hit.contact.id,
                        truncate_cell(&hit.contact.name, 20),
                        truncate_cell(&hit.organization_name, 28),
                        hit.default_address.as_deref().unwrap_or("(no default address)")
                    );
                }
            }
        },
        Commands::Simulate {
            recipients,
            carrier,
            seed,
            json,
        } => {
            let report = simulate(
                &config,
                load_directory(None)?,
                SimulationOptions {
                    recipients,
                    carrier,
                    seed,
                    ..Default::default()
                },
            )
            .await?;
            if json {
                print_json(&report)?;
            } else {
                let stages: Vec<String> = report.stages.iter().map(|s| s.to_string()).collect();
                println!("Job {}", report.job_id);
                println!("Stages: {}", stages.join(" -> "));
                println!(
                    "Addresses fixed: {}, exceptions accepted: {}",
                    report.fixed_addresses, report.accepted_exceptions
                );
                println!(
                    "Delivered {}/{}, in transit {}, exceptions {}",
                    report.counters.delivered,
                    report.counters.total,
                    report.counters.in_transit,
                    report.counters.exceptions
                );
                println!();
                print!("{}", report.tracking_report);
            }
        }
    }

    Ok(())
}
