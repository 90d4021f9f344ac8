//! Costpipe - main entry point
//!
//! Exit codes: 0 success (including a run with nothing new to load), 1 run
//! failure, 2 invalid configuration.

use chrono::Utc;
use clap::Parser;
use costpipe_common::logging::{
    init_logging, init_logging_with_run_log, LogConfig, LogLevel, RunLogFile,
};
use costpipe_common::types::RunOutcome;
use costpipe_ingest::backup::DatasetBackup;
use costpipe_ingest::cli::{Cli, Commands};
use costpipe_ingest::clients::auth::token_provider;
use costpipe_ingest::clients::bigquery::BigQueryClient;
use costpipe_ingest::clients::{http_client, DatasetRef};
use costpipe_ingest::config::PipelineConfig;
use costpipe_ingest::pipeline::PipelineRunner;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

const CONFIG_ERROR_EXIT_CODE: u8 = 2;

fn config_error() -> ExitCode {
    ExitCode::from(CONFIG_ERROR_EXIT_CODE)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid configuration: {:#}", e);
            return config_error();
        },
    };

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = match LogConfig::builder()
        .level(level)
        .log_file_prefix("costpipe")
        .build()
        .merge_env()
    {
        Ok(log_config) => log_config,
        Err(e) => {
            eprintln!("Error: invalid logging configuration: {:#}", e);
            return config_error();
        },
    };

    match cli.command {
        Commands::Run {
            target_date,
            work_dir,
        } => {
            let mut config = config;
            if target_date.is_some() {
                config.run.target_date = target_date;
            }
            if let Some(work_dir) = work_dir {
                config.run.work_dir = work_dir;
            }
            run(config, &log_config).await
        },
        Commands::Backup {
            source_dataset,
            backup_dataset,
            overwrite,
        } => backup(config, &log_config, &source_dataset, &backup_dataset, overwrite).await,
    }
}

async fn run(config: PipelineConfig, log_config: &LogConfig) -> ExitCode {
    let target_date = config.run.resolve_target_date(Utc::now());
    let run_log = RunLogFile::for_date(PathBuf::from(&config.run.log_dir), target_date);

    if let Err(e) = init_logging_with_run_log(log_config, Some(&run_log)) {
        eprintln!("Error: failed to initialize logging: {:#}", e);
        return config_error();
    }

    if let Err(e) = config.validate() {
        error!(error = %format!("{:#}", e), "Invalid configuration");
        return config_error();
    }

    let runner = match PipelineRunner::from_config(&config, target_date) {
        Ok(runner) => runner.with_run_log(run_log),
        Err(e) => {
            error!(error = %e, "Failed to set up the pipeline");
            return config_error();
        },
    };

    let report = runner.run().await;
    ExitCode::from(report.exit_code())
}

async fn backup(
    config: PipelineConfig,
    log_config: &LogConfig,
    source_dataset: &str,
    backup_dataset: &str,
    overwrite: bool,
) -> ExitCode {
    if let Err(e) = init_logging(log_config) {
        eprintln!("Error: failed to initialize logging: {:#}", e);
        return config_error();
    }

    if let Err(e) = config.validate_warehouse() {
        error!(error = %format!("{:#}", e), "Invalid configuration");
        return config_error();
    }

    let default_project = config.warehouse.project.as_str();
    let (Some(source), Some(backup)) = (
        DatasetRef::parse(source_dataset, default_project),
        DatasetRef::parse(backup_dataset, default_project),
    ) else {
        error!(
            source = source_dataset,
            backup = backup_dataset,
            "Datasets must be given as 'project.dataset' or 'dataset'"
        );
        return config_error();
    };

    let http = match http_client() {
        Ok(http) => http,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            return config_error();
        },
    };
    let tokens = token_provider(&config.auth, http.clone());
    let warehouse = Arc::new(BigQueryClient::new(
        http,
        config.warehouse.endpoint.clone(),
        tokens,
    ));

    let outcome = match DatasetBackup::new(warehouse, &config.warehouse)
        .overwrite(overwrite)
        .run(&source, &backup)
        .await
    {
        Ok(report) if report.is_complete() => {
            info!("Backed up {} table(s) to {}", report.copied.len(), backup);
            RunOutcome::Success
        },
        Ok(report) => {
            for failed in &report.failed {
                error!(table = %failed.table, reason = %failed.reason, "Not backed up");
            }
            RunOutcome::Failure
        },
        Err(e) => {
            error!(error = %e, "Backup failed");
            RunOutcome::Failure
        },
    };

    ExitCode::from(outcome.exit_code())
}
