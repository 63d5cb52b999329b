//! Run lifecycle status and process exit codes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Starting,
    Running,
    Completed,
    /// Stopped through the cancellation token.
    Cancelled,
    /// The run started but was aborted by a bot or data fault.
    Failed,
    /// The run could not be set up.
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Starting | RunStatus::Running)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Starting | RunStatus::Running | RunStatus::Completed => 0,
            RunStatus::Cancelled => 130,
            RunStatus::Failed | RunStatus::Error => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Starting => "starting",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
