//! rotate - grandfather-father-son backup rotation.
//!
//! Keeps a bounded set of hourly, daily, weekly, monthly and yearly backups
//! in a local directory or object storage bucket and deletes the rest.

mod cli;
mod telemetry;

use clap::Parser;

use rotate_core::{config::RotateConfig, format_size, ClassifyOutcome};
use rotate_engine::{RotationManager, RotationReport};
use rotate_store::{provider_for, Location, StoreSettings};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RotateConfig::load()?;
    cli.apply(&mut config);

    telemetry::configure_tracing(&config.logging.level, config.logging.json)?;
    tracing::info!(path = %cli.path, "Starting rotation v{}", env!("CARGO_PKG_VERSION"));

    let scheme = config.retention_scheme()?;
    if scheme.dry_run {
        tracing::info!("Dry-run mode on");
    }

    let location = Location::parse(&cli.path)?;
    let provider = provider_for(&location, &StoreSettings::from(&config)).await?;

    let manager = RotationManager::new(provider, Some(scheme), cli.path.as_str())
        .with_concurrency(config.deletion.concurrency);
    let report = manager.rotate().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &RotationReport) {
    let summary = match &report.outcome {
        ClassifyOutcome::NoArtifacts => {
            println!("No files to rotate");
            return;
        }
        ClassifyOutcome::NotEligible => {
            println!("Only one file to rotate, ignoring rotation");
            return;
        }
        ClassifyOutcome::Classified(summary) => summary,
    };

    print!("{summary}");

    let deletion = &report.deletion;
    if deletion.dry_run {
        println!("Dry run: {} file(s) would be deleted", deletion.attempted);
    } else {
        println!(
            "Deleted {} of {} file(s), freed {}",
            deletion.deleted,
            deletion.attempted,
            format_size(deletion.bytes_freed)
        );
        for failure in &deletion.failures {
            println!("  failed: {} ({})", failure.identifier, failure.message);
        }
    }
}
