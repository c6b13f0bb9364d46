//! Token-by-token translation with incremental tool-call reconstruction.

use std::collections::{BTreeMap, HashSet};

use tracing::trace;

use super::tool_state::ToolCallStreamState;
use super::translator::{EventTranslator, REASONING_HEADER};
use crate::models::event::{AgentEvent, THINK_TOOL};
use crate::models::notification::{
    SessionUpdate, ToolCallContent, ToolCallStart, ToolCallStatus, ToolCallUpdate,
};
use crate::models::stream::{StreamChunk, ToolCallDelta};

/// Streaming counterpart of [`EventTranslator`].
///
/// Token chunks drive free text and tool-call previews. Complete events that
/// follow are translated without repeating what the stream already showed:
/// a call that was started gets an update instead of a second start, a
/// streamed think call is not repeated, and agent messages are skipped.
#[derive(Debug, Default)]
pub struct TokenStreamAggregator {
    translator: EventTranslator,
    calls: BTreeMap<u32, ToolCallStreamState>,
    started_calls: HashSet<String>,
    streamed_thoughts: HashSet<String>,
    reasoning_header_emitted: bool,
}

impl TokenStreamAggregator {
    /// Fresh aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates for one token chunk.
    ///
    /// Tool-call fragments are taken from every choice and grouped by their
    /// own index. Free text and reasoning are taken from choice 0 only.
    pub fn on_token(&mut self, chunk: &StreamChunk) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        for choice in &chunk.choices {
            for fragment in &choice.delta.tool_calls {
                self.on_tool_fragment(fragment, &mut updates);
            }
            if choice.index != 0 {
                continue;
            }

            if let Some(reasoning) = choice.delta.reasoning_content.as_deref() {
                if !reasoning.is_empty() {
                    if self.reasoning_header_emitted {
                        updates.push(SessionUpdate::thought(reasoning));
                    } else {
                        self.reasoning_header_emitted = true;
                        updates.push(SessionUpdate::thought(format!(
                            "{REASONING_HEADER}{reasoning}"
                        )));
                    }
                }
            }
            if let Some(content) = choice.delta.content.as_deref() {
                if !content.is_empty() {
                    updates.push(SessionUpdate::message(content));
                }
            }
        }
        updates
    }

    /// Updates for a complete (non-streamed) event.
    pub fn on_event(&mut self, event: &AgentEvent) -> Vec<SessionUpdate> {
        if matches!(event, AgentEvent::InternalStateUpdate { .. }) {
            return Vec::new();
        }
        // A complete event ends the current response.
        self.reasoning_header_emitted = false;

        match event {
            AgentEvent::Action(action) => {
                if action.tool_name == THINK_TOOL
                    && self.streamed_thoughts.remove(&action.tool_call_id)
                {
                    return Vec::new();
                }
                let update = self.translator.action_call(action);
                if !self.started_calls.contains(&action.tool_call_id) {
                    return vec![update];
                }
                match update {
                    SessionUpdate::ToolCallStart(start) => {
                        vec![SessionUpdate::ToolCallUpdate(finalize_started(start))]
                    }
                    other => vec![other],
                }
            }
            AgentEvent::Observation(observation) => {
                let updates = self.translator.observation(observation).into_iter().collect();
                self.prune(&observation.tool_call_id);
                updates
            }
            AgentEvent::Message(_) => Vec::new(),
            other => self.translator.translate(other),
        }
    }

    /// Number of tracked streaming calls.
    #[must_use]
    pub fn tracked_calls(&self) -> usize {
        self.calls.len()
    }

    fn on_tool_fragment(&mut self, fragment: &ToolCallDelta, updates: &mut Vec<SessionUpdate>) {
        let index = fragment.index;
        if let (Some(id), Some(name)) = (
            fragment.id.as_deref().filter(|id| !id.is_empty()),
            fragment.name.as_deref().filter(|name| !name.is_empty()),
        ) {
            let replace = match self.calls.get(&index) {
                Some(state) => state.tool_call_id() != id,
                None => true,
            };
            if replace {
                trace!(index, tool_call_id = id, tool = name, "tracking streamed tool call");
                self.calls.insert(index, ToolCallStreamState::new(id, name));
            }
        }

        let Some(state) = self.calls.get_mut(&index) else {
            return;
        };
        let new_args = fragment.arguments.as_deref().filter(|args| !args.is_empty());
        if let Some(args) = new_args {
            state.append_args(args);
        }
        if !state.has_valid_skeleton() {
            return;
        }

        if state.is_think() {
            if let Some(piece) = state.take_thought_delta() {
                self.streamed_thoughts
                    .insert(state.tool_call_id().to_owned());
                updates.push(SessionUpdate::thought(piece));
            }
            return;
        }

        let (Some(title), Some(kind)) = (state.title(), state.kind()) else {
            return;
        };
        if !state.started() {
            state.mark_started();
            self.started_calls.insert(state.tool_call_id().to_owned());
            updates.push(SessionUpdate::ToolCallStart(ToolCallStart {
                tool_call_id: state.tool_call_id().to_owned(),
                title,
                kind,
                status: ToolCallStatus::InProgress,
                content: ToolCallContent::from_text(state.raw_args()),
                locations: state.locations(),
                raw_input: None,
            }));
        } else if new_args.is_some() {
            updates.push(SessionUpdate::ToolCallUpdate(ToolCallUpdate {
                tool_call_id: state.tool_call_id().to_owned(),
                title: Some(title),
                kind: Some(kind),
                status: Some(ToolCallStatus::InProgress),
                content: ToolCallContent::from_text(state.raw_args()),
                locations: state.locations(),
                ..ToolCallUpdate::default()
            }));
        }
    }

    /// Drop all state for a call once its result was translated.
    fn prune(&mut self, tool_call_id: &str) {
        self.calls
            .retain(|_, state| state.tool_call_id() != tool_call_id);
        self.started_calls.remove(tool_call_id);
        self.streamed_thoughts.remove(tool_call_id);
    }
}

fn finalize_started(start: ToolCallStart) -> ToolCallUpdate {
    ToolCallUpdate {
        tool_call_id: start.tool_call_id,
        title: Some(start.title),
        kind: Some(start.kind),
        status: Some(start.status),
        content: start.content,
        locations: start.locations,
        raw_input: start.raw_input,
        raw_output: None,
    }
}
