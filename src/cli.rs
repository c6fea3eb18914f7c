//! Command-line interface.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::archive::snapshot::SnapshotRequest;

#[derive(Debug, Parser)]
#[command(name = "valuewatch", about = "Put-option scanner and DCF valuation tracker")]
pub struct Cli {
    /// Config file (overrides VALUEWATCH_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand, PartialEq)]
pub enum Commands {
    /// Run the service: periodic scans, valuations and snapshot checks
    Run,
    /// Run one put-option scan and print the results
    Scan,
    /// Recompute intrinsic values
    Valuations {
        /// Only these symbols (default: all active)
        symbols: Vec<String>,
        /// Bypass the fundamentals cache
        #[arg(long)]
        force: bool,
    },
    /// Create quarterly valuation snapshots
    Snapshot {
        /// Period date, YYYY-MM-DD (default: current quarter start)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Only these symbols (default: all active)
        symbols: Vec<String>,
        /// Replace existing snapshots for the period
        #[arg(long)]
        force: bool,
        /// Report what would happen without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Compare a security's current value with its snapshots
    Compare { symbol: String },
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

/// `None` for an empty list, meaning "all active securities".
pub fn symbol_filter(symbols: &[String]) -> Option<Vec<String>> {
    (!symbols.is_empty()).then(|| symbols.to_vec())
}

pub fn snapshot_request(
    date: Option<NaiveDate>,
    symbols: &[String],
    force: bool,
    dry_run: bool,
) -> SnapshotRequest {
    SnapshotRequest {
        date,
        symbols: symbol_filter(symbols),
        force,
        dry_run,
    }
}
