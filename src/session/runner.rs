//! Confirmation-flow run loop.
//!
//! Drives a conversation through run cycles until it finishes, pauses, or a
//! confirmation is deferred. A single call may perform many cycle and
//! confirmation round trips.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, error, info, warn};

use super::confirmation::unmatched_actions;
use crate::conversation::Conversation;
use crate::models::confirmation::{ConfirmationResult, PendingAction, UserDecision};
use crate::models::message::UserMessage;
use crate::models::status::ExecutionStatus;
use crate::Result;

/// Supplies decisions at confirmation checkpoints.
///
/// The run loop awaits the returned future without polling anything else, so
/// an implementation may suspend for as long as the user takes.
pub trait Confirmer: Send + Sync {
    /// Decide on the pending actions of a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the decision could not be obtained; the run loop
    /// ends with that error.
    fn confirm<'a>(
        &'a self,
        session_id: &'a str,
        pending: &'a [PendingAction],
    ) -> Pin<Box<dyn Future<Output = Result<ConfirmationResult>> + Send + 'a>>;
}

/// How a run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The agent completed its turn.
    Finished,
    /// The conversation was paused from outside.
    Paused,
    /// The user deferred a confirmation; the conversation is paused and
    /// still waiting on it.
    Deferred,
    /// The conversation reported a status the loop does not handle.
    Faulted(ExecutionStatus),
}

impl RunOutcome {
    /// ACP `stopReason` for a prompt that ended this way.
    #[must_use]
    pub fn stop_reason(self) -> &'static str {
        match self {
            Self::Paused | Self::Deferred => "cancelled",
            Self::Finished | Self::Faulted(_) => "end_turn",
        }
    }
}

/// Hand `message` to the conversation, then run it.
///
/// # Errors
///
/// Propagates conversation and confirmer errors; see
/// [`run_with_confirmation`].
pub async fn run_prompt(
    session_id: &str,
    conversation: &dyn Conversation,
    message: UserMessage,
    confirmer: &dyn Confirmer,
) -> Result<RunOutcome> {
    conversation.send_message(message).await?;
    run_with_confirmation(session_id, conversation, confirmer).await
}

/// Run cycles until the conversation leaves the confirmation loop.
///
/// A conversation already waiting for confirmation (from a deferred
/// decision) gets its decision before the first cycle.
///
/// # Errors
///
/// Propagates errors from the conversation and the confirmer. Errors end
/// the loop only; the conversation stays usable.
pub async fn run_with_confirmation(
    session_id: &str,
    conversation: &dyn Conversation,
    confirmer: &dyn Confirmer,
) -> Result<RunOutcome> {
    let mut status = conversation.execution_status().await?;
    let mut run_next = status != ExecutionStatus::WaitingForConfirmation;
    let mut cycles = 0_u32;

    loop {
        if run_next {
            cycles += 1;
            debug!(session_id, cycles, "running cycle");
            status = conversation.run_one_cycle().await?;
        }
        run_next = true;

        match status {
            ExecutionStatus::Finished => {
                info!(session_id, cycles, "run finished");
                return Ok(RunOutcome::Finished);
            }
            ExecutionStatus::WaitingForConfirmation => {
                let events = conversation.events().await?;
                let pending = unmatched_actions(&events);
                let result = if pending.is_empty() {
                    warn!(session_id, "waiting for confirmation with no pending actions");
                    ConfirmationResult::accept()
                } else {
                    info!(session_id, pending = pending.len(), "confirmation required");
                    confirmer.confirm(session_id, &pending).await?
                };

                match result.decision {
                    UserDecision::Accept => {
                        if let Some(policy) = result.policy_change {
                            info!(session_id, ?policy, "confirmation policy changed");
                            conversation.set_confirmation_policy(policy).await?;
                        }
                    }
                    UserDecision::Reject { reason } => {
                        info!(session_id, reason, "pending actions rejected");
                        conversation.reject_pending(reason).await?;
                    }
                    UserDecision::Defer => {
                        info!(session_id, "confirmation deferred");
                        conversation.pause().await?;
                        return Ok(RunOutcome::Deferred);
                    }
                }
            }
            ExecutionStatus::Paused => {
                info!(session_id, cycles, "run paused");
                return Ok(RunOutcome::Paused);
            }
            other => {
                error!(session_id, status = %other, "unexpected execution status, ending run");
                return Ok(RunOutcome::Faulted(other));
            }
        }
    }
}
