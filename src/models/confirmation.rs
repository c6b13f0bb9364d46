//! Confirmation checkpoint data.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::mode::ConfirmationPolicy;

/// An action proposed by the agent that has no observation yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAction {
    /// Action event id.
    pub action_id: String,
    /// Call id the client sees.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Tool arguments.
    pub arguments: Value,
    /// Title shown in the permission prompt.
    pub title: String,
}

/// Caller decision at a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserDecision {
    /// Run the pending actions.
    Accept,
    /// Mark the pending actions rejected.
    Reject {
        /// Reason recorded on the rejection observations.
        reason: String,
    },
    /// Pause and hand control back to the caller.
    Defer,
}

/// Decision plus an optional policy change applied before continuing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationResult {
    /// The decision.
    pub decision: UserDecision,
    /// Policy to install on the handle, if any.
    pub policy_change: Option<ConfirmationPolicy>,
}

impl ConfirmationResult {
    /// Accept without a policy change.
    #[must_use]
    pub fn accept() -> Self {
        Self {
            decision: UserDecision::Accept,
            policy_change: None,
        }
    }

    /// Reject with a reason.
    #[must_use]
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            decision: UserDecision::Reject {
                reason: reason.into(),
            },
            policy_change: None,
        }
    }

    /// Defer.
    #[must_use]
    pub fn defer() -> Self {
        Self {
            decision: UserDecision::Defer,
            policy_change: None,
        }
    }

    /// Attach a policy change.
    #[must_use]
    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy_change = Some(policy);
        self
    }
}
