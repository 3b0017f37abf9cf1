/// Job status definitions for the crawl job state machine
///
/// Jobs move strictly forward: `Pending -> Running -> {Completed, Failed}`.
use serde::Serialize;
use std::fmt;

/// Represents the lifecycle status of a crawl job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job has been submitted but traversal has not started
    Pending,

    /// Traversal is in progress
    Running,

    /// Traversal finished (frontier exhausted or page budget reached)
    Completed,

    /// Job setup failed or an error escaped the traversal loop
    Failed,
}

impl JobStatus {
    /// Returns true if this is a terminal state (no further mutation allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the state machine permits moving from `self` to `next`
    ///
    /// Only `Pending -> Running`, `Running -> Completed` and
    /// `Running -> Failed` are legal.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible job statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![Self::Pending, Self::Running, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
