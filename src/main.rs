//! Ledger CLI Tool
//!
//! Command-line tool for appending to and inspecting compliance hash chains

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compliance_ledger::ledger::canonical::format_timestamp;
use compliance_ledger::{ChainEntry, ChainLedger, ChainScope, LedgerConfig, Payload};

#[derive(Parser)]
#[command(name = "ledgerctl")]
#[command(about = "Compliance hash-chain ledger tool")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database URL (overrides configuration)
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Append an entry to a chain
    Append {
        /// Scope key, e.g. correction:global or ae_followup:17
        #[arg(short, long)]
        scope: String,

        /// Acting user or system identifier
        #[arg(short, long)]
        actor: String,

        /// Payload as a JSON object
        #[arg(short, long)]
        payload: String,

        /// RFC 3339 timestamp (defaults to now)
        #[arg(short, long)]
        timestamp: Option<String>,
    },

    /// Print the entries of a chain
    Show {
        /// Scope key
        scope: String,

        /// Print entries as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Print the latest entry of a chain
    Head {
        /// Scope key
        scope: String,
    },

    /// List every chain in the ledger
    Scopes,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compliance_ledger=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = LedgerConfig::load_from(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    if let Commands::Config = cli.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let ledger = ChainLedger::open(&config).await?;
    info!("Ledger opened");

    match cli.command {
        Commands::Append {
            scope,
            actor,
            payload,
            timestamp,
        } => {
            let payload = parse_payload(&payload)?;
            let timestamp = match timestamp {
                Some(ts) => DateTime::parse_from_rfc3339(&ts)
                    .with_context(|| format!("Invalid timestamp: {}", ts))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };

            let receipt = ledger.append_entry(&scope, payload, &actor, timestamp).await?;

            println!("Entry appended:");
            println!("  Entry ID: {}", receipt.entry_id);
            println!("  Scope: {}", receipt.scope_key);
            println!("  Sequence: {}", receipt.sequence);
            println!("  Entry Hash: {}", receipt.entry_hash);
        }

        Commands::Show { scope, json } => {
            let entries = ledger.get_chain(&scope).await?;
            if json {
                for entry in &entries {
                    println!("{}", serde_json::to_string(entry)?);
                }
            } else {
                print_entries(&entries);
            }
        }

        Commands::Head { scope } => {
            let scope = ChainScope::parse(&scope)?;
            match ledger.head(&scope).await? {
                Some(entry) => print_entry_details(&entry),
                None => println!("Chain is empty: {}", scope),
            }
        }

        Commands::Scopes => {
            let scopes = ledger.scopes().await?;
            if scopes.is_empty() {
                println!("No chains found");
            } else {
                println!("{:<40} {:>8}  {}", "Scope", "Entries", "Head Hash");
                println!("{}", "-".repeat(122));
                for scope in scopes {
                    println!(
                        "{:<40} {:>8}  {}",
                        scope.scope_key, scope.entry_count, scope.head_hash
                    );
                }
            }
        }

        // printed before the ledger was opened
        Commands::Config => {}
    }

    ledger.database().close().await;
    Ok(())
}

fn parse_payload(raw: &str) -> Result<Payload> {
    match serde_json::from_str::<serde_json::Value>(raw).context("Payload is not valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(anyhow!("Payload must be a JSON object")),
    }
}

fn print_entries(entries: &[ChainEntry]) {
    if entries.is_empty() {
        println!("No entries found");
        return;
    }

    println!(
        "{:>6}  {:<28} {:<20} {:<20}",
        "Seq", "Timestamp", "Actor", "Entry Hash"
    );
    println!("{}", "-".repeat(100));

    for entry in entries {
        println!(
            "{:>6}  {:<28} {:<20} {}",
            entry.sequence,
            format_timestamp(&entry.timestamp),
            entry.actor,
            entry.entry_hash
        );
    }
}

fn print_entry_details(entry: &ChainEntry) {
    println!("Entry Details:");
    println!("  Entry ID: {}", entry.entry_id);
    println!("  Scope: {}", entry.scope_key);
    println!("  Sequence: {}", entry.sequence);
    println!("  Actor: {}", entry.actor);
    println!("  Timestamp: {}", format_timestamp(&entry.timestamp));
    println!("  Previous Hash: {}", entry.previous_hash);
    println!("  Entry Hash: {}", entry.entry_hash);

    if !entry.payload.is_empty() {
        println!("  Payload:");
        for (k, v) in &entry.payload {
            println!("    {}: {}", k, v);
        }
    }
}
