//! Build automation tasks for costpipe
//!
//! - `generate-cli-docs`: renders the CLI reference from the clap definitions

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for costpipe", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the CLI reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<costpipe_ingest::cli::Cli>();

    let content = format!(
        r#"# costpipe CLI Reference

This documentation is auto-generated from the CLI source code. Last updated: {}.

## Overview

`costpipe` ingests the daily cost and usage reports of an OCI tenancy into
BigQuery. One run materializes the source credentials from Secret Manager,
downloads the reports created on the target date, stages the decompressed CSV
files in Cloud Storage, appends them to the cost table and archives the staged
objects.

## Commands

{}

## Exit Codes

| Code | Meaning |
|------|---------|
| `0`  | Run succeeded, or there was nothing new to load |
| `1`  | Run failed |
| `2`  | Invalid configuration |

## Environment Variables

All settings are read from `COSTPIPE_*` variables; a `.env` file in the working
directory is loaded first when present.

| Variable | Default | Purpose |
|----------|---------|---------|
| `COSTPIPE_GCP_PROJECT` | | Project for Secret Manager and BigQuery |
| `COSTPIPE_CONFIG_SECRET_ID` | | Secret holding the OCI profile |
| `COSTPIPE_KEY_SECRET_ID` | | Secret holding the API signing key |
| `COSTPIPE_SOURCE_BACKEND` | `native` | `native` or `s3-compat` |
| `COSTPIPE_SOURCE_NAMESPACE` | `bling` | Object Storage namespace of the reports |
| `COSTPIPE_SOURCE_BUCKET` | tenancy OCID | Bucket holding the reports |
| `COSTPIPE_SOURCE_PREFIX` | `reports/cost-csv` | Prefix of the cost reports |
| `COSTPIPE_DEST_BUCKET` | | Cloud Storage bucket for staging and archive |
| `COSTPIPE_STAGING_PREFIX` | `staging` | Folder of staged files |
| `COSTPIPE_ARCHIVE_PREFIX` | `archive` | Folder of archived files |
| `COSTPIPE_LOG_PREFIX` | `logs` | Folder receiving run logs |
| `COSTPIPE_BQ_DATASET` | | Target dataset |
| `COSTPIPE_BQ_TABLE` | | Target table |
| `COSTPIPE_BQ_LOCATION` | `US` | Dataset and job location |
| `COSTPIPE_TARGET_DATE` | yesterday (UTC) | Day to ingest, `YYYY-MM-DD` |
| `COSTPIPE_FETCH_CONCURRENCY` | `1` | Reports downloaded in parallel |
| `LOG_LEVEL` | `info` | Logging level (`trace` to `error`) |
| `LOG_FORMAT` | `text` | `text` or `json` |

## Examples

```bash
# Ingest yesterday's reports
costpipe run

# Re-ingest a given day
costpipe run --target-date 2024-03-01

# Back up the cost dataset, replacing previous copies
costpipe backup --source-dataset billing --backup-dataset billing_backup --overwrite
```

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
