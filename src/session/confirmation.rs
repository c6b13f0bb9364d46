//! Pending-action extraction from the event-log tail.

use std::collections::HashSet;

use crate::events::tool_kind::display_title;
use crate::models::confirmation::PendingAction;
use crate::models::event::{AgentEvent, MessageSource};

/// Actions in the current turn that have no observation yet, oldest first.
///
/// Scans backwards and stops at the most recent user message, so actions
/// from earlier turns are never offered again.
#[must_use]
pub fn unmatched_actions(events: &[AgentEvent]) -> Vec<PendingAction> {
    let mut observed: HashSet<&str> = HashSet::new();
    let mut pending = Vec::new();

    for event in events.iter().rev() {
        match event {
            AgentEvent::Observation(observation) => {
                observed.insert(observation.tool_call_id.as_str());
            }
            AgentEvent::Action(action) if !observed.contains(action.tool_call_id.as_str()) => {
                pending.push(PendingAction {
                    action_id: action.id.clone(),
                    tool_call_id: action.tool_call_id.clone(),
                    tool_name: action.tool_name.clone(),
                    arguments: action.arguments.clone(),
                    title: display_title(
                        &action.tool_name,
                        action.arguments.as_object(),
                        action.summary.as_deref(),
                    ),
                });
            }
            AgentEvent::Message(message) if message.source == MessageSource::User => break,
            _ => {}
        }
    }

    pending.reverse();
    pending
}
