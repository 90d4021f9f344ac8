//! Configuration management
//!
//! All settings come from `COSTPIPE_*` environment variables (a `.env` file is
//! loaded first when present). Optional settings fall back to the `DEFAULT_*`
//! constants below.

use chrono::{DateTime, NaiveDate, Utc};
use costpipe_common::object_path;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Secret version selector used when none is configured.
pub const DEFAULT_SECRET_VERSION: &str = "latest";

/// Object storage namespace that holds the cost reports.
pub const DEFAULT_SOURCE_NAMESPACE: &str = "bling";

/// Prefix of the cost reports inside the report bucket.
pub const DEFAULT_SOURCE_PREFIX: &str = "reports/cost-csv";

/// Profile section read from the credential INI document.
pub const DEFAULT_PROFILE_NAME: &str = "DEFAULT";

/// Folder of the destination bucket holding files ready to load.
pub const DEFAULT_STAGING_PREFIX: &str = "staging";

/// Folder of the destination bucket holding loaded files.
pub const DEFAULT_ARCHIVE_PREFIX: &str = "archive";

/// Folder of the destination bucket receiving run logs.
pub const DEFAULT_LOG_PREFIX: &str = "logs";

/// Warehouse dataset location used when the dataset has to be created.
pub const DEFAULT_WAREHOUSE_LOCATION: &str = "US";

/// Deadline for the load job in seconds (1 hour).
pub const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 3600;

/// Interval between load job status polls in seconds.
pub const DEFAULT_LOAD_POLL_INTERVAL_SECS: u64 = 5;

/// Scratch directory for downloads and decompressed files.
pub const DEFAULT_WORK_DIR: &str = "./work";

/// Directory receiving the ephemeral credential bundle.
pub const DEFAULT_CREDENTIALS_DIR: &str = "./credentials";

/// Directory receiving the local run log.
pub const DEFAULT_LOG_DIR: &str = "./logs";

/// Number of reports fetched and staged at the same time.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 1;

/// Compute metadata server used to obtain access tokens.
pub const DEFAULT_METADATA_ENDPOINT: &str = "http://metadata.google.internal";

/// Backend used to talk to the report bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceBackend {
    /// Native Object Storage REST API with signed requests
    #[default]
    Native,
    /// S3 compatibility endpoint
    S3Compat,
}

impl std::str::FromStr for SourceBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "native" | "oci" => Ok(SourceBackend::Native),
            "s3-compat" | "s3" | "s3compat" => Ok(SourceBackend::S3Compat),
            _ => Err(anyhow::anyhow!("Invalid source backend: {}", s)),
        }
    }
}

impl std::fmt::Display for SourceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceBackend::Native => write!(f, "native"),
            SourceBackend::S3Compat => write!(f, "s3-compat"),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub gcp: GcpConfig,
    pub secrets: SecretsConfig,
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub warehouse: WarehouseConfig,
    pub run: RunConfig,
    pub auth: AuthConfig,
}

/// Google Cloud project settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    pub project: String,
}

/// Where the credential secrets live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    pub project: String,
    pub config_secret_id: String,
    pub key_secret_id: String,
    pub version: String,
    pub endpoint: Option<String>,
}

/// Report bucket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub backend: SourceBackend,
    pub namespace: String,
    /// Defaults to the tenancy OCID of the materialized profile
    pub bucket: Option<String>,
    pub prefix: String,
    pub profile_name: String,
    pub endpoint: Option<String>,
}

/// Destination bucket layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub bucket: String,
    pub staging_prefix: String,
    pub archive_prefix: String,
    pub log_prefix: String,
    pub endpoint: Option<String>,
}

/// Warehouse target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub project: String,
    pub dataset: String,
    pub table: String,
    pub location: String,
    pub load_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub endpoint: Option<String>,
}

/// Per-run local settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub work_dir: PathBuf,
    pub credentials_dir: PathBuf,
    pub log_dir: PathBuf,
    pub fetch_concurrency: usize,
    pub target_date: Option<NaiveDate>,
}

/// Access token source for Google APIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Static bearer token; the metadata server is used when absent
    pub access_token: Option<String>,
    pub metadata_endpoint: String,
}

impl DestinationConfig {
    /// Staging, archive and log folders must be disjoint: the load job reads
    /// everything under the staging folder and the archive step renames it.
    fn validate_folders(&self) -> anyhow::Result<()> {
        let folders = [
            ("COSTPIPE_STAGING_PREFIX", &self.staging_prefix),
            ("COSTPIPE_ARCHIVE_PREFIX", &self.archive_prefix),
            ("COSTPIPE_LOG_PREFIX", &self.log_prefix),
        ];

        for (key, prefix) in &folders {
            if object_path::folder(prefix).is_empty() {
                anyhow::bail!("{} must name a folder, got '{}'", key, prefix);
            }
        }

        for (i, (key_a, a)) in folders.iter().enumerate() {
            for (key_b, b) in &folders[i + 1..] {
                let (folder_a, folder_b) = (object_path::folder(a), object_path::folder(b));
                if folder_a.starts_with(&folder_b) || folder_b.starts_with(&folder_a) {
                    anyhow::bail!(
                        "{} ('{}') and {} ('{}') must not overlap",
                        key_a,
                        a,
                        key_b,
                        b
                    );
                }
            }
        }

        Ok(())
    }
}

impl WarehouseConfig {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl RunConfig {
    /// Directory receiving compressed downloads
    pub fn download_dir(&self) -> PathBuf {
        self.work_dir.join("downloads")
    }

    /// Directory receiving decompressed reports
    pub fn decompress_dir(&self) -> PathBuf {
        self.work_dir.join("reports")
    }

    /// Configured target date, or yesterday relative to `now` in UTC.
    pub fn resolve_target_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.target_date.unwrap_or_else(|| {
            let today = now.date_naive();
            today.pred_opt().unwrap_or(today)
        })
    }
}

impl PipelineConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Read configuration from process environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let project = var("COSTPIPE_GCP_PROJECT").unwrap_or_default();

        let backend = match var("COSTPIPE_SOURCE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => SourceBackend::default(),
        };

        let target_date = match var("COSTPIPE_TARGET_DATE") {
            Some(raw) => Some(parse_target_date(&raw)?),
            None => None,
        };

        Ok(Self {
            gcp: GcpConfig {
                project: project.clone(),
            },
            secrets: SecretsConfig {
                project: var("COSTPIPE_SECRET_PROJECT").unwrap_or_else(|| project.clone()),
                config_secret_id: var("COSTPIPE_CONFIG_SECRET_ID").unwrap_or_default(),
                key_secret_id: var("COSTPIPE_KEY_SECRET_ID").unwrap_or_default(),
                version: or_default("COSTPIPE_SECRET_VERSION", DEFAULT_SECRET_VERSION),
                endpoint: var("COSTPIPE_SECRET_MANAGER_ENDPOINT"),
            },
            source: SourceConfig {
                backend,
                namespace: or_default("COSTPIPE_SOURCE_NAMESPACE", DEFAULT_SOURCE_NAMESPACE),
                bucket: var("COSTPIPE_SOURCE_BUCKET"),
                prefix: or_default("COSTPIPE_SOURCE_PREFIX", DEFAULT_SOURCE_PREFIX),
                profile_name: or_default("COSTPIPE_SOURCE_PROFILE", DEFAULT_PROFILE_NAME),
                endpoint: var("COSTPIPE_SOURCE_ENDPOINT"),
            },
            destination: DestinationConfig {
                bucket: var("COSTPIPE_DEST_BUCKET").unwrap_or_default(),
                staging_prefix: or_default("COSTPIPE_STAGING_PREFIX", DEFAULT_STAGING_PREFIX),
                archive_prefix: or_default("COSTPIPE_ARCHIVE_PREFIX", DEFAULT_ARCHIVE_PREFIX),
                log_prefix: or_default("COSTPIPE_LOG_PREFIX", DEFAULT_LOG_PREFIX),
                endpoint: var("COSTPIPE_STORAGE_ENDPOINT"),
            },
            warehouse: WarehouseConfig {
                project: var("COSTPIPE_BQ_PROJECT").unwrap_or_else(|| project.clone()),
                dataset: var("COSTPIPE_BQ_DATASET").unwrap_or_default(),
                table: var("COSTPIPE_BQ_TABLE").unwrap_or_default(),
                location: or_default("COSTPIPE_BQ_LOCATION", DEFAULT_WAREHOUSE_LOCATION),
                load_timeout_secs: parse_or(
                    "COSTPIPE_LOAD_TIMEOUT_SECS",
                    var("COSTPIPE_LOAD_TIMEOUT_SECS"),
                    DEFAULT_LOAD_TIMEOUT_SECS,
                )?,
                poll_interval_secs: parse_or(
                    "COSTPIPE_LOAD_POLL_SECS",
                    var("COSTPIPE_LOAD_POLL_SECS"),
                    DEFAULT_LOAD_POLL_INTERVAL_SECS,
                )?,
                endpoint: var("COSTPIPE_BIGQUERY_ENDPOINT"),
            },
            run: RunConfig {
                work_dir: PathBuf::from(or_default("COSTPIPE_WORK_DIR", DEFAULT_WORK_DIR)),
                credentials_dir: PathBuf::from(or_default(
                    "COSTPIPE_CREDENTIALS_DIR",
                    DEFAULT_CREDENTIALS_DIR,
                )),
                log_dir: PathBuf::from(or_default("COSTPIPE_LOG_DIR", DEFAULT_LOG_DIR)),
                fetch_concurrency: parse_or(
                    "COSTPIPE_FETCH_CONCURRENCY",
                    var("COSTPIPE_FETCH_CONCURRENCY"),
                    DEFAULT_FETCH_CONCURRENCY,
                )?,
                target_date,
            },
            auth: AuthConfig {
                access_token: var("COSTPIPE_ACCESS_TOKEN"),
                metadata_endpoint: or_default(
                    "COSTPIPE_METADATA_ENDPOINT",
                    DEFAULT_METADATA_ENDPOINT,
                ),
            },
        })
    }

    /// Validate everything a pipeline run needs
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_warehouse()?;

        if self.secrets.project.is_empty() {
            anyhow::bail!("COSTPIPE_SECRET_PROJECT or COSTPIPE_GCP_PROJECT must be set");
        }

        if self.secrets.config_secret_id.is_empty() {
            anyhow::bail!("COSTPIPE_CONFIG_SECRET_ID must be set");
        }

        if self.secrets.key_secret_id.is_empty() {
            anyhow::bail!("COSTPIPE_KEY_SECRET_ID must be set");
        }

        if self.destination.bucket.is_empty() {
            anyhow::bail!("COSTPIPE_DEST_BUCKET must be set");
        }

        if self.warehouse.dataset.is_empty() {
            anyhow::bail!("COSTPIPE_BQ_DATASET must be set");
        }

        if self.warehouse.table.is_empty() {
            anyhow::bail!("COSTPIPE_BQ_TABLE must be set");
        }

        self.destination.validate_folders()?;

        if self.run.fetch_concurrency == 0 {
            anyhow::bail!("COSTPIPE_FETCH_CONCURRENCY must be greater than 0");
        }

        if self.warehouse.poll_interval_secs == 0 {
            anyhow::bail!("COSTPIPE_LOAD_POLL_SECS must be greater than 0");
        }

        if self.source.bucket.is_none() {
            tracing::debug!("No source bucket configured - the profile tenancy will be used");
        }

        Ok(())
    }

    /// Validate the subset needed by warehouse-only commands (backup)
    pub fn validate_warehouse(&self) -> anyhow::Result<()> {
        if self.warehouse.project.is_empty() {
            anyhow::bail!("COSTPIPE_BQ_PROJECT or COSTPIPE_GCP_PROJECT must be set");
        }

        if self.warehouse.location.is_empty() {
            anyhow::bail!("COSTPIPE_BQ_LOCATION cannot be empty");
        }

        Ok(())
    }
}

/// Parse an optional variable, falling back to `default` only when it is unset
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

/// Parse a `YYYY-MM-DD` target date
pub fn parse_target_date(raw: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid target date '{}': {} (expected YYYY-MM-DD)", raw, e))
}
