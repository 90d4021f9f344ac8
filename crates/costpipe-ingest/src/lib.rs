//! Costpipe Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Daily ingestion of cloud cost reports into the analytics warehouse.
//!
//! A run for a target date walks through these stages:
//!
//! 1. **Credentials**: two secrets (an INI profile and a PEM key) are fetched and
//!    materialized into a short-lived credential bundle on disk.
//! 2. **Catalog**: the report bucket is listed and filtered to reports created on
//!    the target date.
//! 3. **Fetch**: each report is streamed to disk and gunzipped.
//! 4. **Staging**: decompressed files are uploaded under the staging prefix of the
//!    destination bucket.
//! 5. **Load**: one append-only load job moves the staged CSVs into the warehouse.
//! 6. **Archive**: staged objects are renamed under the archive prefix.
//!
//! Cleanup of credentials, scratch directories and the run log happens on every
//! exit path. See [`pipeline::runner::PipelineRunner`].
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use costpipe_ingest::{config::PipelineConfig, pipeline::runner::PipelineRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::load()?;
//!     let target_date = config.run.resolve_target_date(Utc::now());
//!     let runner = PipelineRunner::from_config(&config, target_date)?;
//!     let report = runner.run().await;
//!     std::process::exit(report.exit_code().into());
//! }
//! ```

pub mod backup;
pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod pipeline;

pub use error::{ClientError, LoadJobError, PipelineError};
