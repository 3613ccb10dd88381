//! Status module - tri-state outcome shared by sources, engines and flags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a tracked step
///
/// Every per-source outcome, per-engine status and aggregate flag
/// (`downloaded`, `has_content`) uses this one enum:
/// - Unknown: not attempted yet, or reset
/// - Success: the step produced a valid artifact
/// - Failure: the step ran and did not
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Not attempted (or reset)
    #[default]
    Unknown,

    /// Completed with a valid artifact
    Success,

    /// Attempted without a valid artifact
    Failure,
}

impl Status {
    /// Get the persisted name
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Success => "success",
            Status::Failure => "failure",
        }
    }

    /// Parse a persisted value
    ///
    /// Accepts the legacy tracker spellings (`yes`/`no`, `not_attempted`,
    /// `failed`) so old databases read back cleanly.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "unknown" | "not_attempted" | "" => Some(Status::Unknown),
            "success" | "yes" => Some(Status::Success),
            "failure" | "failed" | "no" => Some(Status::Failure),
            _ => None,
        }
    }

    /// Build from a boolean outcome
    pub fn from_outcome(success: bool) -> Self {
        if success {
            Status::Success
        } else {
            Status::Failure
        }
    }

    /// Whether this is [`Status::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Success)
    }

    /// Whether this is [`Status::Failure`]
    pub fn is_failure(&self) -> bool {
        matches!(self, Status::Failure)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid status: {}", s))
    }
}
