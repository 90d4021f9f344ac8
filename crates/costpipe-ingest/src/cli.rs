//! Command-line interface of the `costpipe` binary
//!
//! Everything except the flags below comes from `COSTPIPE_*` environment
//! variables (see [`crate::config`]).

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::parse_target_date;

/// Costpipe - daily cost report ingestion
#[derive(Parser, Debug)]
#[command(name = "costpipe")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest the cost reports created on one day
    Run {
        /// Day to ingest, YYYY-MM-DD (defaults to yesterday, UTC)
        #[arg(long, env = "COSTPIPE_TARGET_DATE", value_parser = parse_date)]
        target_date: Option<NaiveDate>,

        /// Scratch directory for downloads
        #[arg(long, env = "COSTPIPE_WORK_DIR")]
        work_dir: Option<PathBuf>,
    },

    /// Copy every table of a dataset into a backup dataset
    Backup {
        /// Dataset to back up (`project.dataset` or `dataset`)
        #[arg(long)]
        source_dataset: String,

        /// Dataset receiving the copies, created when missing
        #[arg(long)]
        backup_dataset: String,

        /// Replace existing backup tables instead of refusing non-empty ones
        #[arg(long)]
        overwrite: bool,
    },
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    parse_target_date(raw).map_err(|e| e.to_string())
}
