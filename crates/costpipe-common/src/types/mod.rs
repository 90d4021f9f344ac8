//! Common types used across Costpipe

use serde::{Deserialize, Serialize};

/// Terminal result of one pipeline run, as reported to the invoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Data loaded and archived, or nothing new to load
    Success,
    /// A fatal stage error aborted the run
    Failure,
}

impl RunOutcome {
    /// Process exit code for the invoking scheduler
    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::Success => 0,
            RunOutcome::Failure => 1,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, RunOutcome::Success)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RunOutcome::Success => "success",
            RunOutcome::Failure => "failure",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_outcome_exit_codes() {
        assert_eq!(RunOutcome::Success.exit_code(), 0);
        assert_eq!(RunOutcome::Failure.exit_code(), 1);
        assert!(RunOutcome::Success.is_success());
        assert!(!RunOutcome::Failure.is_success());
    }
}
