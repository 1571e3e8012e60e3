use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, Command};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use compliance_ledger::ledger::verify::VerificationReport;
use compliance_ledger::{ChainLedger, LedgerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new("verify-ledger")
        .version("1.0.0")
        .about("Verify compliance hash-chain integrity")
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .help("Ledger database URL (overrides configuration)"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("scope")
                .short('s')
                .long("scope")
                .value_name("SCOPE")
                .action(ArgAction::Append)
                .help("Scope key to verify (repeatable); all scopes when omitted"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .help("Suppress output except errors"),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    tracing_subscriber::registry()
        .with(log_filter(verbose, quiet))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let mut config = LedgerConfig::load_from(config_path.as_deref())?;
    if let Some(url) = matches.get_one::<String>("database-url") {
        config.database_url = url.clone();
    }
    let scopes: Vec<String> = matches
        .get_many::<String>("scope")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let ledger = ChainLedger::open(&config).await?;
    let reports = verify_scopes(&ledger, &scopes).await?;
    ledger.database().close().await;

    if !quiet {
        print_reports(&reports, verbose);
    }

    let broken: Vec<&VerificationReport> = reports.iter().filter(|r| !r.valid).collect();
    if !broken.is_empty() {
        for report in &broken {
            error!("{}", report.summary());
        }
        std::process::exit(1);
    }

    if !quiet {
        println!("✓ Ledger verification completed successfully");
    }

    Ok(())
}

/// `RUST_LOG` unless a flag forces the level
fn log_filter(verbose: bool, quiet: bool) -> EnvFilter {
    if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("compliance_ledger=debug,verify_ledger=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "compliance_ledger=info".into())
    }
}

async fn verify_scopes(ledger: &ChainLedger, scopes: &[String]) -> Result<Vec<VerificationReport>> {
    if scopes.is_empty() {
        info!("Verifying every chain in the ledger");
        let reports = ledger.verify_all().await?;
        if reports.is_empty() {
            return Err(anyhow!("Ledger holds no chains"));
        }
        return Ok(reports);
    }

    let mut reports = Vec::with_capacity(scopes.len());
    for scope in scopes {
        info!("Verifying chain: {}", scope);
        reports.push(ledger.verify_chain(scope).await?);
    }
    Ok(reports)
}

fn print_reports(reports: &[VerificationReport], verbose: bool) {
    for report in reports {
        println!("{}", report.summary());

        if verbose {
            if let Some(head) = &report.head_hash {
                println!("  Head hash: {}", head);
            }
            for violation in &report.violations {
                println!("  Sequence {}: {}", violation.sequence, violation.kind);
            }
        }
    }

    if verbose {
        // Entry distribution per domain
        let mut domains: HashMap<&str, u64> = HashMap::new();
        for report in reports {
            let domain = report
                .scope_key
                .split_once(':')
                .map(|(domain, _)| domain)
                .unwrap_or(report.scope_key.as_str());
            *domains.entry(domain).or_insert(0) += report.total_entries;
        }

        let mut domains: Vec<(&str, u64)> = domains.into_iter().collect();
        domains.sort();

        println!("\nEntries per domain:");
        for (domain, count) in domains {
            println!("  {}: {}", domain, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_environment_filter() {
        assert_eq!(log_filter(false, true).to_string(), "error");

        let verbose = log_filter(true, false).to_string();
        assert!(verbose.contains("compliance_ledger=debug"));
        assert!(verbose.contains("verify_ledger=debug"));
    }
}
