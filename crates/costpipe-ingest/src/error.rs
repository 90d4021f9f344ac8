//! Error types for the ingestion pipeline
//!
//! Two layers:
//!
//! - [`ClientError`] is raised by collaborator adapters (secret store, object
//!   storage, warehouse) and carries transport-level detail.
//! - [`PipelineError`] is the stage taxonomy the runner reasons about. Whether a
//!   stage error is fatal or local to one report is decided by the runner, not
//!   by the error itself.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline stages
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised at the collaborator boundary
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport failure (connection, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote service answered with a non-success status
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists (create conflicts)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Access token could not be obtained
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Request signing failed (bad key, unsupported key format)
    #[error("Request signing failed: {0}")]
    Signing(String),

    /// Response body did not have the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Error from the S3 SDK
    #[error("Object storage SDK error: {0}")]
    Sdk(String),

    /// Local file operation failed
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn sdk(msg: impl Into<String>) -> Self {
        Self::Sdk(msg.into())
    }

    /// Build an error from a non-success HTTP status, mapping 404 and 409.
    pub fn from_status(service: &'static str, status: u16, body: String) -> Self {
        match status {
            404 => Self::NotFound(format!("{}: {}", service, body)),
            409 => Self::AlreadyExists(format!("{}: {}", service, body)),
            _ => Self::Status {
                service,
                status,
                body,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Failures of the warehouse load (and backup copy) jobs
#[derive(Error, Debug)]
pub enum LoadJobError {
    /// Warehouse API call failed
    #[error("warehouse request failed: {0}")]
    Client(#[from] ClientError),

    /// Destination dataset could not be ensured
    #[error("dataset '{dataset}' is not available: {reason}")]
    Dataset { dataset: String, reason: String },

    /// Job reached a terminal state with an error result
    #[error("job {job_id} failed: {message}")]
    Failed { job_id: String, message: String },

    /// Job did not reach a terminal state before the deadline
    #[error("job {job_id} did not finish within {timeout:?}")]
    Timeout { job_id: String, timeout: Duration },
}

/// Stage errors of a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A credential secret could not be fetched
    #[error("Failed to access secret '{secret}': {source}")]
    SecretAccess {
        secret: String,
        #[source]
        source: ClientError,
    },

    /// A credential file could not be written
    #[error("Failed to write credential file '{}': {source}", path.display())]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The profile secret is not a usable INI profile
    #[error("Invalid credential profile: {0}")]
    InvalidProfile(String),

    /// Source listing failed (transport, auth)
    #[error("Failed to list objects under '{prefix}': {source}")]
    Listing {
        prefix: String,
        #[source]
        source: ClientError,
    },

    /// A report could not be downloaded
    #[error("Failed to download '{object}': {reason}")]
    Download { object: String, reason: String },

    /// A downloaded report could not be decompressed
    #[error("Failed to decompress '{}': {source}", path.display())]
    Decompress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be uploaded to staging
    #[error("Failed to upload '{object}': {reason}")]
    Upload { object: String, reason: String },

    /// The warehouse load did not complete successfully
    #[error("Load job failed: {0}")]
    LoadJob(#[from] LoadJobError),

    /// Some staged objects could not be archived
    #[error("Archive failed: {reason}")]
    Archive {
        reason: String,
        unmoved: Vec<String>,
    },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local file operation failed
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn download(object: impl Into<String>, reason: impl ToString) -> Self {
        Self::Download {
            object: object.into(),
            reason: reason.to_string(),
        }
    }

    pub fn upload(object: impl Into<String>, reason: impl ToString) -> Self {
        Self::Upload {
            object: object.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_profile(msg: impl Into<String>) -> Self {
        Self::InvalidProfile(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Archive error for objects that stayed under the staging prefix
    pub fn archive_incomplete(unmoved: Vec<String>) -> Self {
        Self::Archive {
            reason: format!(
                "{} object(s) still staged: {}",
                unmoved.len(),
                unmoved.join(", ")
            ),
            unmoved,
        }
    }

    /// Name of the stage that produced the error, used in logs and run reports
    pub fn stage(&self) -> &'static str {
        match self {
            Self::SecretAccess { .. } | Self::ConfigWrite { .. } | Self::InvalidProfile(_) => {
                "credentials"
            },
            Self::Listing { .. } => "catalog",
            Self::Download { .. } | Self::Decompress { .. } => "fetch",
            Self::Upload { .. } => "staging",
            Self::LoadJob(_) => "load",
            Self::Archive { .. } => "archive",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}
