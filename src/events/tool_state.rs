//! Reconstruction state for one streaming tool call.

use serde_json::{Map, Value};

use super::partial_json::PartialDocument;
use super::tool_kind::{tool_kind, tool_locations, tool_title};
use crate::models::event::{FILE_EDITOR_TOOL, THINK_TOOL};
use crate::models::notification::{ToolCallLocation, ToolKind};

/// Prefix of the first streamed thought fragment of a think call.
pub const THOUGHT_HEADER: &str = "\n**Thought**:\n";

/// Per stream-index buffer for a tool call whose arguments are still
/// arriving.
///
/// Nothing about the call is shown until the arguments form a valid
/// skeleton. Validity never reverts once reached, and the kind is computed
/// once at that point. The title is recomputed on every read because paths
/// keep arriving after the skeleton is valid.
#[derive(Debug, Clone)]
pub struct ToolCallStreamState {
    tool_call_id: String,
    tool_name: String,
    args: PartialDocument,
    started: bool,
    cached_kind: Option<ToolKind>,
    skeleton_valid: bool,
    emitted_thought: String,
    thought_header_emitted: bool,
}

impl ToolCallStreamState {
    /// Fresh state for a call.
    #[must_use]
    pub fn new(tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args: PartialDocument::new(),
            started: false,
            cached_kind: None,
            skeleton_valid: false,
            emitted_thought: String::new(),
            thought_header_emitted: false,
        }
    }

    /// Call id.
    #[must_use]
    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    /// Tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Whether this is the think tool, which never starts a tool call.
    #[must_use]
    pub fn is_think(&self) -> bool {
        self.tool_name == THINK_TOOL
    }

    /// Whether a `ToolCallStart` was emitted for this call.
    #[must_use]
    pub fn started(&self) -> bool {
        self.started
    }

    /// Record that the start notification went out.
    pub fn mark_started(&mut self) {
        self.started = true;
    }

    /// Append an argument fragment.
    pub fn append_args(&mut self, fragment: &str) {
        self.args.push(fragment);
    }

    /// Raw accumulated argument text.
    #[must_use]
    pub fn raw_args(&self) -> &str {
        self.args.as_str()
    }

    /// Best-effort parsed arguments.
    #[must_use]
    pub fn parsed_args(&self) -> Option<Map<String, Value>> {
        self.args.object()
    }

    /// Whether enough arguments arrived to show the call without later
    /// contradicting its title or kind.
    ///
    /// Requires one key with a non-null, non-empty value. The file editor
    /// also needs `command`, since its kind depends on it.
    pub fn has_valid_skeleton(&mut self) -> bool {
        if self.skeleton_valid {
            return true;
        }
        if self.args.is_empty() {
            return false;
        }
        let Some(parsed) = self.parsed_args() else {
            return false;
        };

        let has_content = parsed.values().any(|value| match value {
            Value::Null => false,
            Value::String(text) => !text.is_empty(),
            _ => true,
        });
        if !has_content {
            return false;
        }

        if self.tool_name == FILE_EDITOR_TOOL {
            let command = parsed.get("command").and_then(Value::as_str);
            if !matches!(command, Some(command) if !command.is_empty()) {
                return false;
            }
        }

        self.skeleton_valid = true;
        self.cached_kind = Some(tool_kind(&self.tool_name, Some(&parsed)));
        true
    }

    /// Kind, available once the skeleton is valid.
    #[must_use]
    pub fn kind(&self) -> Option<ToolKind> {
        self.cached_kind
    }

    /// Current title, available once the skeleton is valid.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        if !self.skeleton_valid {
            return None;
        }
        Some(tool_title(&self.tool_name, self.parsed_args().as_ref()))
    }

    /// Locations known from the arguments so far.
    #[must_use]
    pub fn locations(&self) -> Option<Vec<ToolCallLocation>> {
        tool_locations(&self.tool_name, self.parsed_args().as_ref())
    }

    /// New suffix of the think tool's `thought` argument since the last
    /// call, with the header on the first non-empty piece.
    pub fn take_thought_delta(&mut self) -> Option<String> {
        if !self.is_think() {
            return None;
        }
        let parsed = self.parsed_args()?;
        let thought = parsed.get("thought").and_then(Value::as_str)?;
        let delta = thought.strip_prefix(self.emitted_thought.as_str())?;
        if delta.is_empty() {
            return None;
        }

        let mut piece = String::new();
        if !self.thought_header_emitted {
            self.thought_header_emitted = true;
            piece.push_str(THOUGHT_HEADER);
        }
        piece.push_str(delta);
        self.emitted_thought = thought.to_owned();
        Some(piece)
    }
}
