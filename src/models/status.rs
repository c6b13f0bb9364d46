//! Run-cycle execution status reported by a conversation.

use serde::{Deserialize, Serialize};

/// State of a conversation's run cycle.
///
/// Only the confirmation runner moves a conversation between these states;
/// engines report them, they never choose transitions on their own.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// No cycle has run since the last prompt.
    #[default]
    Idle,
    /// A cycle is executing.
    Running,
    /// The agent halted on an action that needs explicit approval.
    WaitingForConfirmation,
    /// The cycle was paused (cancel request or deferred confirmation).
    Paused,
    /// The cycle completed.
    Finished,
    /// The engine reported an unrecoverable error for this cycle.
    Error,
    /// The engine detected the agent looping without progress.
    Stuck,
}

impl ExecutionStatus {
    /// Stable lowercase name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::WaitingForConfirmation => "waiting_for_confirmation",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Error => "error",
            Self::Stuck => "stuck",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
