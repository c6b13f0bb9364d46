//! Batched event-to-notification translation.

use super::tool_kind::{display_title, tool_kind, tool_locations};
use crate::models::event::{
    ActionEvent, AgentEvent, MessageSource, ObservationEvent, ObservationKind, TaskStatus,
    FINISH_TOOL, THINK_TOOL,
};
use crate::models::notification::{
    PlanEntry, PlanEntryPriority, PlanEntryStatus, SessionUpdate, ToolCallContent, ToolCallStart,
    ToolCallStatus, ToolCallUpdate,
};

pub use super::tool_state::THOUGHT_HEADER;

/// Prefix of reasoning text, emitted once per response.
pub const REASONING_HEADER: &str = "**Reasoning**:\n";

/// Maps complete agent events to session updates.
///
/// Translation is a pure function of the event: replaying a log yields the
/// same updates in the same order.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventTranslator;

impl EventTranslator {
    /// Updates for one event, in emission order.
    #[must_use]
    pub fn translate(&self, event: &AgentEvent) -> Vec<SessionUpdate> {
        match event {
            AgentEvent::Action(action) => {
                let mut updates = Self::action_preamble(action);
                updates.push(self.action_call(action));
                updates
            }
            AgentEvent::Observation(observation) => {
                self.observation(observation).into_iter().collect()
            }
            AgentEvent::Message(message) => {
                if message.source == MessageSource::User || message.text.is_empty() {
                    Vec::new()
                } else {
                    vec![SessionUpdate::message(message.text.clone())]
                }
            }
            AgentEvent::SystemPrompt { .. }
            | AgentEvent::Pause { .. }
            | AgentEvent::Condensation { .. }
            | AgentEvent::CondensationRequest { .. } => {
                vec![SessionUpdate::thought(event.plain_text())]
            }
            AgentEvent::InternalStateUpdate { .. } => Vec::new(),
        }
    }

    /// Updates for a replayed log, in log order.
    #[must_use]
    pub fn translate_all<'a>(
        &self,
        events: impl IntoIterator<Item = &'a AgentEvent>,
    ) -> Vec<SessionUpdate> {
        events
            .into_iter()
            .flat_map(|event| self.translate(event))
            .collect()
    }

    /// The tool-call part of an action: a thought for `think`, a message for
    /// `finish`, otherwise an `in_progress` start.
    #[must_use]
    pub fn action_call(&self, action: &ActionEvent) -> SessionUpdate {
        let rendered = action.plain_text();
        match action.tool_name.as_str() {
            THINK_TOOL => SessionUpdate::thought(rendered),
            FINISH_TOOL => SessionUpdate::message(rendered),
            _ => {
                let args = action.arguments.as_object();
                SessionUpdate::ToolCallStart(ToolCallStart {
                    tool_call_id: action.tool_call_id.clone(),
                    title: display_title(&action.tool_name, args, action.summary.as_deref()),
                    kind: tool_kind(&action.tool_name, args),
                    status: ToolCallStatus::InProgress,
                    content: ToolCallContent::from_text(&rendered),
                    locations: tool_locations(&action.tool_name, args),
                    raw_input: Some(action.arguments.clone()),
                })
            }
        }
    }

    /// Update for an observation; `None` for the think and finish tools and
    /// the task list becomes a plan.
    #[must_use]
    pub fn observation(&self, observation: &ObservationEvent) -> Option<SessionUpdate> {
        let status = match &observation.observation {
            ObservationKind::Rejected { .. } | ObservationKind::Error { .. } => {
                ToolCallStatus::Failed
            }
            _ if matches!(observation.tool_name.as_str(), THINK_TOOL | FINISH_TOOL) => {
                return None;
            }
            ObservationKind::TaskList { tasks } => {
                let entries = tasks
                    .iter()
                    .map(|task| PlanEntry {
                        content: task.title.clone(),
                        priority: PlanEntryPriority::Medium,
                        status: match task.status {
                            TaskStatus::Todo => PlanEntryStatus::Pending,
                            TaskStatus::InProgress => PlanEntryStatus::InProgress,
                            TaskStatus::Done => PlanEntryStatus::Completed,
                        },
                    })
                    .collect();
                return Some(SessionUpdate::PlanUpdate { entries });
            }
            ObservationKind::Output { .. } => ToolCallStatus::Completed,
        };

        let rendered = observation.observation.plain_text();
        Some(SessionUpdate::ToolCallUpdate(ToolCallUpdate {
            tool_call_id: observation.tool_call_id.clone(),
            status: Some(status),
            content: ToolCallContent::from_text(&rendered),
            raw_output: serde_json::to_value(observation).ok(),
            ..ToolCallUpdate::default()
        }))
    }

    /// Reasoning then thought chunks attached to an action.
    fn action_preamble(action: &ActionEvent) -> Vec<SessionUpdate> {
        let mut updates = Vec::new();
        if let Some(reasoning) = action
            .reasoning_content
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
        {
            updates.push(SessionUpdate::thought(format!(
                "{REASONING_HEADER}{reasoning}\n"
            )));
        }
        let thought = action.thought_text();
        if !thought.is_empty() {
            updates.push(SessionUpdate::thought(format!(
                "{THOUGHT_HEADER}{thought}\n"
            )));
        }
        updates
    }
}
