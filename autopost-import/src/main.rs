//! autopost-import - Import X analytics exports
//!
//! Reads a post-level or account-overview CSV export, detects which one it
//! is, and merges it into the Autopost data directory. Also lists the post
//! history so an import can be checked from the shell.

use clap::{Parser, Subcommand};
use libautopost::generator::prompt::truncate_chars;
use libautopost::logging::LoggingConfig;
use libautopost::{AutopostError, DataPaths, EngagementImporter, HistoryStore, OverviewStore, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "autopost-import")]
#[command(version)]
#[command(about = "Import X analytics CSV exports into the Autopost history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import an analytics CSV (newest file in the inbox when PATH is omitted)
    Csv {
        /// CSV file to import
        path: Option<PathBuf>,
    },

    /// List recent history entries, newest first
    History {
        /// Number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("warn", cli.verbose).init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = DataPaths::resolve()?;
    paths.ensure()?;
    let history = HistoryStore::new(paths.history_file());
    let json = cli.format == "json";

    match cli.command {
        Commands::Csv { path } => {
            let importer =
                EngagementImporter::new(history, OverviewStore::new(paths.overview_file()));
            let summary = match path {
                Some(path) => importer.import_file(&path)?,
                None => importer.import_latest(&paths.inbox_dir())?,
            };
            info!("Import finished: {:?}", summary);

            if json {
                println!("{}", to_json(&summary)?);
            } else {
                println!(
                    "{} imported={} updated={} skipped={}",
                    summary.kind, summary.imported, summary.updated, summary.skipped
                );
            }
        }
        Commands::History { limit } => {
            let entries: Vec<_> = history.newest_first().into_iter().take(limit).collect();
            if json {
                println!("{}", to_json(&entries)?);
            } else if entries.is_empty() {
                println!("No history entries");
            } else {
                for entry in entries {
                    println!(
                        "{}\t{}\tlikes {}\timp {}\t{}",
                        entry.timestamp,
                        if entry.platform.is_empty() { "-" } else { &entry.platform },
                        entry.likes(),
                        entry.impressions(),
                        truncate_chars(&entry.text.replace('\n', " "), 60)
                    );
                }
            }
        }
    }
    Ok(())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| AutopostError::InvalidInput(format!("Could not encode output: {}", e)))
}
