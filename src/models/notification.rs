//! `session/update` notification payloads sent to the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ordered unit of output for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Target session.
    pub session_id: String,
    /// Update body.
    pub update: SessionUpdate,
}

impl Notification {
    /// Wrap an update for a session.
    #[must_use]
    pub fn new(session_id: impl Into<String>, update: SessionUpdate) -> Self {
        Self {
            session_id: session_id.into(),
            update,
        }
    }
}

/// Closed set of session updates, tagged with ACP's `sessionUpdate` names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "sessionUpdate")]
pub enum SessionUpdate {
    /// Visible agent text.
    #[serde(rename = "agent_message_chunk")]
    MessageChunk {
        /// Text block.
        content: ContentBlock,
    },
    /// Agent reasoning text.
    #[serde(rename = "agent_thought_chunk")]
    ThoughtChunk {
        /// Text block.
        content: ContentBlock,
    },
    /// A tool call became visible.
    #[serde(rename = "tool_call")]
    ToolCallStart(ToolCallStart),
    /// Progress or result for a started tool call.
    #[serde(rename = "tool_call_update")]
    ToolCallUpdate(ToolCallUpdate),
    /// The agent's plan changed.
    #[serde(rename = "plan")]
    PlanUpdate {
        /// Full plan in display order.
        entries: Vec<PlanEntry>,
    },
    /// Slash commands the session accepts.
    #[serde(rename = "available_commands_update")]
    AvailableCommands {
        /// Command list.
        #[serde(rename = "availableCommands")]
        available_commands: Vec<AvailableCommand>,
    },
    /// The session's confirmation mode changed.
    #[serde(rename = "current_mode_update")]
    ModeState {
        /// New mode id.
        #[serde(rename = "currentModeId")]
        current_mode_id: String,
    },
}

impl SessionUpdate {
    /// Agent message text chunk.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self::MessageChunk {
            content: ContentBlock::text(text),
        }
    }

    /// Agent thought text chunk.
    #[must_use]
    pub fn thought(text: impl Into<String>) -> Self {
        Self::ThoughtChunk {
            content: ContentBlock::text(text),
        }
    }

    /// Tool call id carried by start/update variants.
    #[must_use]
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Self::ToolCallStart(start) => Some(&start.tool_call_id),
            Self::ToolCallUpdate(update) => Some(&update.tool_call_id),
            _ => None,
        }
    }
}

/// Content block; only text is produced by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// Text body.
        text: String,
    },
}

impl ContentBlock {
    /// Text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Text body.
    #[must_use]
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }
}

/// Content attached to a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolCallContent {
    /// Regular content block.
    Content {
        /// Wrapped block.
        content: ContentBlock,
    },
}

impl ToolCallContent {
    /// Wrap text as tool call content; blank text yields nothing.
    #[must_use]
    pub fn from_text(text: &str) -> Option<Vec<Self>> {
        if text.trim().is_empty() {
            return None;
        }
        Some(vec![Self::Content {
            content: ContentBlock::text(text),
        }])
    }
}

/// File location touched by a tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallLocation {
    /// Absolute or workspace-relative path.
    pub path: String,
    /// Optional 1-based line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

/// ACP tool kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Reads files.
    Read,
    /// Modifies files.
    Edit,
    /// Deletes files.
    Delete,
    /// Moves files.
    Move,
    /// Searches.
    Search,
    /// Runs commands.
    Execute,
    /// Internal reasoning.
    Think,
    /// Network retrieval.
    Fetch,
    /// Mode switch.
    SwitchMode,
    /// Anything else.
    Other,
}

/// Tool call lifecycle states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Not yet running.
    Pending,
    /// Running.
    InProgress,
    /// Done.
    Completed,
    /// Rejected or errored.
    Failed,
}

/// Payload of a `tool_call` update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallStart {
    /// Call id.
    pub tool_call_id: String,
    /// Human title.
    pub title: String,
    /// Tool kind.
    pub kind: ToolKind,
    /// Status, `in_progress` for every start the bridge emits.
    pub status: ToolCallStatus,
    /// Rendered content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ToolCallContent>>,
    /// Touched file locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ToolCallLocation>>,
    /// Raw tool arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
}

/// Payload of a `tool_call_update` update. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallUpdate {
    /// Call id.
    pub tool_call_id: String,
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ToolKind>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
    /// Replacement content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ToolCallContent>>,
    /// Replacement locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ToolCallLocation>>,
    /// Raw tool arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_input: Option<Value>,
    /// Raw tool result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<Value>,
}

/// Plan entry priorities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryPriority {
    /// High.
    High,
    /// Medium.
    Medium,
    /// Low.
    Low,
}

/// Plan entry states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanEntryStatus {
    /// Not started.
    Pending,
    /// Underway.
    InProgress,
    /// Done.
    Completed,
}

/// One plan line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanEntry {
    /// Entry text.
    pub content: String,
    /// Priority.
    pub priority: PlanEntryPriority,
    /// Progress.
    pub status: PlanEntryStatus,
}

/// Slash command advertised to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableCommand {
    /// Command name without the slash.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Argument hint, if the command takes input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<AvailableCommandInput>,
}

/// Free-text argument hint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableCommandInput {
    /// Placeholder text.
    pub hint: String,
}
