//! Collaborator interfaces and their cloud adapters
//!
//! The pipeline only talks to the traits defined here. Production adapters:
//!
//! - [`secret_manager::SecretManagerClient`] implements [`SecretStore`]
//! - [`oci::OciConnector`] implements [`ReportSourceConnector`], producing either
//!   the signed native client or the S3-compatible client
//! - [`gcs::GcsClient`] implements [`DestinationStore`]
//! - [`bigquery::BigQueryClient`] implements [`Warehouse`]
//! - [`auth`] provides bearer tokens for the Google APIs

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClientError;
use crate::pipeline::profile::ProfileSection;
use crate::pipeline::types::{BlobInfo, RemoteObject, UploadedBlob};

pub mod auth;
pub mod bigquery;
pub mod gcs;
pub mod oci;
pub mod secret_manager;

/// Result type alias for collaborator calls
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Body of a source object, delivered in chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Connect timeout for outbound HTTP calls
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Shared HTTP client for all adapters.
///
/// Only connecting is bounded; report downloads may legitimately take long.
pub fn http_client() -> ClientResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .user_agent(concat!("costpipe/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Secret storage
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Text payload of `secret_id` at `version` (e.g. `latest`)
    async fn fetch(&self, project: &str, secret_id: &str, version: &str) -> ClientResult<String>;
}

/// Object storage holding the source reports
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Every object under `prefix`, following pagination until exhausted
    async fn list(
        &self,
        namespace: &str,
        bucket: &str,
        prefix: &str,
    ) -> ClientResult<Vec<RemoteObject>>;

    /// Streaming body of one object
    async fn get(&self, namespace: &str, bucket: &str, name: &str) -> ClientResult<ByteStream>;
}

/// Builds a [`ReportSource`] from a materialized credential profile
#[async_trait]
pub trait ReportSourceConnector: Send + Sync {
    async fn connect(&self, profile: &ProfileSection) -> ClientResult<Arc<dyn ReportSource>>;
}

/// Object storage receiving staged, archived and log objects
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Upload the full content of `local_file` as `name`
    async fn upload(&self, bucket: &str, name: &str, local_file: &Path)
        -> ClientResult<UploadedBlob>;

    /// Every object under `prefix`, following pagination until exhausted
    async fn list_blobs(&self, bucket: &str, prefix: &str) -> ClientResult<Vec<BlobInfo>>;

    /// Atomic server-side rename
    async fn rename_blob(&self, bucket: &str, old_name: &str, new_name: &str) -> ClientResult<()>;
}

/// Fully qualified dataset reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
    pub project: String,
    pub dataset: String,
}

impl DatasetRef {
    pub fn new(project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
        }
    }

    /// Parse `project.dataset`, or a bare `dataset` in `default_project`
    pub fn parse(raw: &str, default_project: &str) -> Option<Self> {
        let mut parts = raw.split('.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(dataset), None, None) if !dataset.is_empty() => {
                Some(Self::new(default_project, dataset))
            },
            (Some(project), Some(dataset), None) if !project.is_empty() && !dataset.is_empty() => {
                Some(Self::new(project, dataset))
            },
            _ => None,
        }
    }

    pub fn table(&self, table: impl Into<String>) -> TableRef {
        TableRef {
            project: self.project.clone(),
            dataset: self.dataset.clone(),
            table: table.into(),
        }
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

/// Fully qualified table reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// How a job treats existing table data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    WriteAppend,
    WriteTruncate,
    WriteEmpty,
}

/// Bulk load of delimited files from object storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJobSpec {
    pub destination: TableRef,
    pub source_uris: Vec<String>,
    pub skip_leading_rows: u32,
    pub autodetect: bool,
    pub write_disposition: WriteDisposition,
}

impl LoadJobSpec {
    /// CSV append with a single header row and the table's existing schema
    pub fn csv_append(destination: TableRef, source_uri: impl Into<String>) -> Self {
        Self {
            destination,
            source_uris: vec![source_uri.into()],
            skip_leading_rows: 1,
            autodetect: false,
            write_disposition: WriteDisposition::WriteAppend,
        }
    }
}

/// Table-to-table copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyJobSpec {
    pub source: TableRef,
    pub destination: TableRef,
    pub write_disposition: WriteDisposition,
}

/// Job submitted to the warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSpec {
    Load(LoadJobSpec),
    Copy(CopyJobSpec),
}

/// Handle used to poll a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub project: String,
    pub job_id: String,
    pub location: String,
}

/// Lifecycle state of a warehouse job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Done,
}

/// Status snapshot of a warehouse job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    /// Error message of a finished job that failed
    pub error: Option<String>,
    /// Rows written by a finished load job
    pub output_rows: Option<i64>,
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }
}

/// Analytical warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn dataset_exists(&self, dataset: &DatasetRef) -> ClientResult<bool>;

    /// Create a dataset; an existing dataset yields [`ClientError::AlreadyExists`]
    async fn create_dataset(&self, dataset: &DatasetRef, location: &str) -> ClientResult<()>;

    /// Submit a job and return its handle without waiting
    async fn insert_job(&self, project: &str, location: &str, job: &JobSpec)
        -> ClientResult<JobHandle>;

    async fn get_job(&self, handle: &JobHandle) -> ClientResult<JobStatus>;

    /// Total rows of a table, when the warehouse reports it
    async fn table_row_count(&self, table: &TableRef) -> ClientResult<Option<i64>>;

    /// Table ids of a dataset, following pagination until exhausted
    async fn list_tables(&self, dataset: &DatasetRef) -> ClientResult<Vec<String>>;
}

/// Read an HTTP response body for an error message, never failing
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {}>", e))
}

/// Map a non-success response to a [`ClientError`]
pub(crate) async fn status_error(service: &'static str, response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let body = error_body(response).await;
    ClientError::from_status(service, status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_ref_parse() {
        assert_eq!(
            DatasetRef::parse("billing", "acme"),
            Some(DatasetRef::new("acme", "billing"))
        );
        assert_eq!(
            DatasetRef::parse("other.billing_backup", "acme"),
            Some(DatasetRef::new("other", "billing_backup"))
        );
        assert_eq!(DatasetRef::parse("a.b.c", "acme"), None);
        assert_eq!(DatasetRef::parse("", "acme"), None);
    }

    #[test]
    fn test_csv_append_load_job() {
        let table = DatasetRef::new("acme", "billing").table("oci_costs");
        let spec = LoadJobSpec::csv_append(table.clone(), "gs://bucket/staging/*");
        assert_eq!(spec.destination.to_string(), "acme.billing.oci_costs");
        assert_eq!(spec.skip_leading_rows, 1);
        assert!(!spec.autodetect);
        assert_eq!(spec.write_disposition, WriteDisposition::WriteAppend);
    }
}
