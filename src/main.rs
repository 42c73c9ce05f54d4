//! Tenki CLI
//!
//! Regional JMA forecasts with a local history of every fetch.

#![allow(clippy::print_stdout)]

use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tenki_core::{AppError, Config};
use tenki_weather::{
    cards, ForecastError, ForecastOutcome, ForecastService, ForecastSnapshot, RegionCatalog,
    DAY_FORMAT,
};

#[derive(Parser)]
#[command(name = "tenki")]
#[command(author, version, about = "Regional weather forecasts from JMA", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List selectable regions grouped by center
    Regions,

    /// Fetch and show the forecast for an office
    ///
    /// Falls back to the most recent stored forecast when the network fails.
    Forecast {
        /// Office code, e.g. 130000
        code: String,
    },

    /// List the days on which forecasts were fetched for an office
    History {
        /// Office code
        code: String,
    },

    /// Show the forecast as fetched on a given day
    AsOf {
        /// Office code
        code: String,

        /// Fetch day (YYYY-MM-DD)
        #[arg(value_parser = parse_day)]
        day: NaiveDate,
    },
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DAY_FORMAT).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e.user_message());
            eprintln!("  ({e})");
            ExitCode::FAILURE
        }
    }
}

/// Only startup failures (logging, configuration, store, region catalog)
/// are returned; every per-region outcome is rendered.
async fn run(command: Commands) -> Result<(), AppError> {
    tenki_core::init()?;
    let (config, _) = Config::load_validated()?;

    let service = ForecastService::from_config(&config)?;
    let catalog = service.load_catalog().await?;

    match command {
        Commands::Regions => print_regions(&catalog),
        Commands::Forecast { code } => {
            if let Some(name) = region_name(&catalog, &code, true) {
                match service.fetch_and_display(&code, &name).await {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => print_failure(&e),
                }
            }
        }
        Commands::History { code } => {
            if let Some(name) = region_name(&catalog, &code, false) {
                match service.list_history(&code).await {
                    Ok(days) if days.is_empty() => println!("No stored forecasts for {name}"),
                    Ok(days) => {
                        println!("{name} ({code})");
                        for day in days {
                            println!("  {}", day.format(DAY_FORMAT));
                        }
                    }
                    Err(e) => print_failure(&e),
                }
            }
        }
        Commands::AsOf { code, day } => {
            if let Some(name) = region_name(&catalog, &code, false) {
                match service.show_as_of(&code, &name, day).await {
                    Ok(snapshot) if snapshot.is_empty() => {
                        println!("No forecast for {name} was fetched on {}", day.format(DAY_FORMAT));
                    }
                    Ok(snapshot) => print_snapshot(&snapshot),
                    Err(e) => print_failure(&e),
                }
            }
        }
    }

    Ok(())
}

/// Office name for a code. Excluded offices still have history but cannot
/// be fetched.
fn region_name(catalog: &RegionCatalog, code: &str, live: bool) -> Option<String> {
    match catalog.office(code) {
        Some(office) if office.selectable || !live => Some(office.name.clone()),
        Some(office) => {
            println!("No forecast is provided for {} ({code})", office.name);
            None
        }
        None => {
            println!("Unknown region code: {code}");
            None
        }
    }
}

fn print_regions(catalog: &RegionCatalog) {
    for group in catalog.selectable_groups() {
        println!("{} ({})", group.center.name, group.center.code);
        for office in group.offices {
            println!("  {}  {}", office.code, office.name);
        }
    }
}

fn print_outcome(outcome: &ForecastOutcome) {
    if let ForecastOutcome::Cached { reason, .. } = outcome {
        println!("[cached] Live forecast unavailable: {reason}");
    }
    print_snapshot(outcome.snapshot());
}

fn print_snapshot(snapshot: &ForecastSnapshot) {
    let mut header = format!("{} ({})", snapshot.region_name, snapshot.region_code);
    if let Some(day) = snapshot.fetched_on {
        header.push_str(&format!(" as of {}", day.format(DAY_FORMAT)));
    } else if let Some(at) = snapshot.fetched_at() {
        header.push_str(&format!(" fetched {}", at.format("%Y-%m-%d %H:%M")));
    }
    println!("{header}");

    for card in cards(&snapshot.records) {
        println!(
            "  {}  {}  {:<24} {:>6} / {:<6}",
            card.date,
            card.icon.glyph(),
            card.summary,
            card.temp_min,
            card.temp_max
        );
    }
}

fn print_failure(err: &ForecastError) {
    tracing::warn!("{}", err);
    println!("{}", err.user_message());
    if let ForecastError::Unavailable { reason, .. } = err {
        println!("  ({reason})");
    }
}
