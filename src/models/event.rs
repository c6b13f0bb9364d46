//! Agent events emitted by a conversation.
//!
//! The set is closed: every consumer matches exhaustively, so a new event
//! kind is a compile-time decision everywhere it is rendered.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::mode::SecurityRisk;

/// Tool that records reasoning without side effects.
pub const THINK_TOOL: &str = "think";
/// Tool that ends the agent's turn with a final message.
pub const FINISH_TOOL: &str = "finish";
/// File viewing and editing tool.
pub const FILE_EDITOR_TOOL: &str = "file_editor";
/// Shell command tool.
pub const TERMINAL_TOOL: &str = "terminal";
/// Plan/task list tool.
pub const TASK_TRACKER_TOOL: &str = "task_tracker";

/// One entry of the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    /// The agent proposed a tool invocation.
    Action(ActionEvent),
    /// A tool invocation produced a result (or was rejected or failed).
    Observation(ObservationEvent),
    /// A chat message from the agent, the user, or the environment.
    Message(MessageEvent),
    /// The system prompt and tool set the agent runs with.
    SystemPrompt {
        /// Event id.
        id: String,
        /// Prompt text.
        system_prompt: String,
        /// Names of the tools offered to the agent.
        #[serde(default)]
        tools: Vec<String>,
    },
    /// The run loop was paused.
    Pause {
        /// Event id.
        id: String,
    },
    /// Older events were condensed into a summary.
    Condensation {
        /// Event id.
        id: String,
        /// Ids of the events dropped from the working context.
        #[serde(default)]
        forgotten_event_ids: Vec<String>,
        /// Optional summary replacing the forgotten events.
        #[serde(default)]
        summary: Option<String>,
    },
    /// The agent asked for its history to be condensed.
    CondensationRequest {
        /// Event id.
        id: String,
    },
    /// Engine-internal bookkeeping; never shown to the client.
    InternalStateUpdate {
        /// Event id.
        id: String,
        /// Updated key.
        key: String,
        /// New value.
        #[serde(default)]
        value: Value,
    },
}

/// A proposed tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionEvent {
    /// Event id.
    pub id: String,
    /// Call id shared with the matching observation.
    pub tool_call_id: String,
    /// Tool name, e.g. `terminal`.
    pub tool_name: String,
    /// Parsed tool arguments.
    #[serde(default)]
    pub arguments: Value,
    /// Free-text thoughts attached to the call.
    #[serde(default)]
    pub thought: Vec<String>,
    /// Model reasoning content, when the provider exposes it.
    #[serde(default)]
    pub reasoning_content: Option<String>,
    /// Short LLM-written description of the call.
    #[serde(default)]
    pub summary: Option<String>,
    /// Analyzer risk verdict.
    #[serde(default)]
    pub security_risk: SecurityRisk,
}

impl ActionEvent {
    /// String argument by key, if present and a string.
    #[must_use]
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    /// Plain-text rendering of the call.
    #[must_use]
    pub fn plain_text(&self) -> String {
        match self.tool_name.as_str() {
            THINK_TOOL => self.str_arg("thought").unwrap_or_default().to_owned(),
            FINISH_TOOL => self.str_arg("message").unwrap_or_default().to_owned(),
            TERMINAL_TOOL => match self.str_arg("command") {
                Some(command) => format!("$ {command}"),
                None => render_generic_action(self),
            },
            _ => render_generic_action(self),
        }
    }

    /// Thought fragments joined with spaces and trimmed.
    #[must_use]
    pub fn thought_text(&self) -> String {
        self.thought.join(" ").trim().to_owned()
    }
}

/// A tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationEvent {
    /// Event id.
    pub id: String,
    /// Call id of the action this observation answers.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: String,
    /// Result payload.
    pub observation: ObservationKind,
}

/// Observation payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObservationKind {
    /// Plain tool output.
    Output {
        /// Rendered output.
        text: String,
    },
    /// Current task list from the task tracker.
    TaskList {
        /// Tasks in display order.
        tasks: Vec<TaskItem>,
    },
    /// The user rejected the action.
    Rejected {
        /// Rejection reason.
        reason: String,
    },
    /// The agent failed to run the action.
    Error {
        /// Error text.
        error: String,
    },
}

impl ObservationKind {
    /// Plain-text rendering of the result.
    #[must_use]
    pub fn plain_text(&self) -> String {
        match self {
            Self::Output { text } => text.clone(),
            Self::TaskList { tasks } => tasks
                .iter()
                .map(|task| {
                    let mark = match task.status {
                        TaskStatus::Todo => "[ ]",
                        TaskStatus::InProgress => "[~]",
                        TaskStatus::Done => "[x]",
                    };
                    format!("{mark} {}", task.title)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Rejected { reason } => format!("Action rejected: {reason}"),
            Self::Error { error } => format!("Error: {error}"),
        }
    }
}

/// One task-tracker entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskItem {
    /// Task title.
    pub title: String,
    /// Free-form notes.
    #[serde(default)]
    pub notes: String,
    /// Progress state.
    pub status: TaskStatus,
}

/// Task-tracker progress states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Finished.
    Done,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEvent {
    /// Event id.
    pub id: String,
    /// Author.
    pub source: MessageSource,
    /// Message text.
    pub text: String,
}

/// Message authors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    /// The agent.
    Agent,
    /// The human user.
    User,
    /// The execution environment.
    Environment,
}

impl AgentEvent {
    /// Event id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Action(action) => &action.id,
            Self::Observation(observation) => &observation.id,
            Self::Message(message) => &message.id,
            Self::SystemPrompt { id, .. }
            | Self::Pause { id }
            | Self::Condensation { id, .. }
            | Self::CondensationRequest { id }
            | Self::InternalStateUpdate { id, .. } => id,
        }
    }

    /// Plain-text rendering used for notification bodies.
    ///
    /// Output depends only on the event's fields, so replaying a log renders
    /// the same text every time.
    #[must_use]
    pub fn plain_text(&self) -> String {
        match self {
            Self::Action(action) => action.plain_text(),
            Self::Observation(observation) => observation.observation.plain_text(),
            Self::Message(message) => message.text.clone(),
            Self::SystemPrompt {
                system_prompt,
                tools,
                ..
            } => {
                let mut out = format!(
                    "System Prompt:\n{system_prompt}\n\nTools Available: {}",
                    tools.len()
                );
                for tool in tools {
                    out.push_str("\n  - ");
                    out.push_str(tool);
                }
                out
            }
            Self::Pause { .. } => "Agent Paused".to_owned(),
            Self::Condensation {
                forgotten_event_ids,
                summary,
                ..
            } => {
                let mut out = format!(
                    "Condensation: {} events forgotten",
                    forgotten_event_ids.len()
                );
                if let Some(summary) = summary.as_deref().filter(|s| !s.trim().is_empty()) {
                    out.push_str("\nSummary: ");
                    out.push_str(summary);
                }
                out
            }
            Self::CondensationRequest { .. } => "Condensation Requested".to_owned(),
            Self::InternalStateUpdate { .. } => String::new(),
        }
    }
}

fn render_generic_action(action: &ActionEvent) -> String {
    let arguments = match &action.arguments {
        Value::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    };
    if arguments.is_empty() {
        format!("Tool: {}", action.tool_name)
    } else {
        format!("Tool: {}\nArguments: {arguments}", action.tool_name)
    }
}
