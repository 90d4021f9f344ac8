//! Values passed between pipeline stages

use chrono::{DateTime, NaiveDate, Utc};
use costpipe_common::types::RunOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// A report object in the source bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub size: Option<u64>,
}

/// An object in the destination bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub name: String,
    pub size: u64,
}

/// Result of a completed upload as reported by the destination store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedBlob {
    pub name: String,
    pub size: u64,
    /// Base64 MD5 digest of the stored content, when the store reports one
    pub md5_base64: Option<String>,
}

/// A report downloaded and ready to stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedReport {
    pub object: String,
    pub local_path: PathBuf,
    pub downloaded_bytes: u64,
}

/// Result of a successful warehouse load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub job_id: String,
    pub rows_loaded: Option<i64>,
    pub table_rows: Option<i64>,
}

/// States of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum RunState {
    Init,
    CredentialsReady,
    Fetched,
    Staged(usize),
    Skipped,
    Loaded,
    Archived,
    CleanedUp(RunOutcome),
}

impl RunState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (CleanedUp(_), _) => false,
            (_, CleanedUp(RunOutcome::Failure)) => true,
            (Init, CredentialsReady) => true,
            (CredentialsReady, Fetched) => true,
            (Fetched, Staged(_)) => true,
            (Staged(0), Skipped) => true,
            (Staged(n), Loaded) => n > 0,
            (Loaded, Archived) => true,
            (Skipped, CleanedUp(RunOutcome::Success)) => true,
            (Archived, CleanedUp(RunOutcome::Success)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "init"),
            RunState::CredentialsReady => write!(f, "credentials_ready"),
            RunState::Fetched => write!(f, "fetched"),
            RunState::Staged(n) => write!(f, "staged({})", n),
            RunState::Skipped => write!(f, "skipped"),
            RunState::Loaded => write!(f, "loaded"),
            RunState::Archived => write!(f, "archived"),
            RunState::CleanedUp(outcome) => write!(f, "cleaned_up({})", outcome),
        }
    }
}

/// Non-fatal problem met during cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupWarning {
    pub action: String,
    pub detail: String,
}

impl CleanupWarning {
    pub fn new(action: impl Into<String>, detail: impl ToString) -> Self {
        Self {
            action: action.into(),
            detail: detail.to_string(),
        }
    }
}

impl fmt::Display for CleanupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.action, self.detail)
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub target_date: NaiveDate,
    /// Every state the run went through, in order
    pub states: Vec<RunState>,
    pub found: usize,
    pub already_archived: usize,
    pub fetched: usize,
    pub staged: usize,
    pub failed: usize,
    pub archived: usize,
    pub load: Option<LoadSummary>,
    /// Stage and message of the fatal error, if any
    pub error: Option<String>,
    pub warnings: Vec<CleanupWarning>,
    /// Remote object name of the uploaded run log
    pub log_object: Option<String>,
}

impl RunReport {
    pub fn new(run_id: Uuid, target_date: NaiveDate) -> Self {
        Self {
            run_id,
            target_date,
            states: vec![RunState::Init],
            found: 0,
            already_archived: 0,
            fetched: 0,
            staged: 0,
            failed: 0,
            archived: 0,
            load: None,
            error: None,
            warnings: Vec::new(),
            log_object: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Init)
    }

    pub fn outcome(&self) -> RunOutcome {
        match self.state() {
            RunState::CleanedUp(outcome) => outcome,
            _ if self.error.is_some() => RunOutcome::Failure,
            _ => RunOutcome::Success,
        }
    }

    /// Whether the run went through the `Skipped` state
    pub fn was_skipped(&self) -> bool {
        self.states.contains(&RunState::Skipped)
    }

    /// Process exit code for the invoking scheduler
    pub fn exit_code(&self) -> u8 {
        self.outcome().exit_code()
    }
}
