//! Stage lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution status of a single stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not started yet.
    Pending,
    /// Stage is executing.
    Running,
    /// Stage finished successfully.
    Completed,
    /// Stage returned an error.
    Failed,
    /// Stage never ran because an earlier stage failed.
    Skipped,
}

impl StageStatus {
    /// Checks if a stage can move to the given status.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Each arm represents a distinct transition rule
    pub fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            // From Pending: can start, or be skipped after an earlier failure
            (Self::Pending, Self::Running | Self::Skipped) => true,
            // From Running: finishes one way or the other
            (Self::Running, Self::Completed | Self::Failed) => true,
            // Any settled stage can be reset for a new run
            (Self::Completed | Self::Failed | Self::Skipped, Self::Pending) => true,
            // All other transitions are invalid
            _ => false,
        }
    }

    /// Whether the stage has settled for the current run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(StageStatus::Pending.can_transition_to(StageStatus::Running));
        assert!(StageStatus::Running.can_transition_to(StageStatus::Completed));
        assert!(StageStatus::Running.can_transition_to(StageStatus::Failed));
        assert!(StageStatus::Pending.can_transition_to(StageStatus::Skipped));
        assert!(StageStatus::Failed.can_transition_to(StageStatus::Pending));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!StageStatus::Pending.can_transition_to(StageStatus::Completed));
        assert!(!StageStatus::Completed.can_transition_to(StageStatus::Running));
        assert!(!StageStatus::Running.can_transition_to(StageStatus::Skipped));
        assert!(!StageStatus::Running.can_transition_to(StageStatus::Running));
    }

    #[test]
    fn test_terminal() {
        assert!(StageStatus::Skipped.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }
}
