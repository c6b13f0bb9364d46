//! Token deltas from a streaming LLM response.

use serde::{Deserialize, Serialize};

/// One streamed chunk, possibly carrying several choices.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamChunk {
    /// Choices in this chunk.
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

/// Delta for one choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamChoice {
    /// Choice index; only index 0 carries displayed free text.
    #[serde(default)]
    pub index: u32,
    /// Delta body.
    #[serde(default)]
    pub delta: StreamDelta,
}

/// Incremental content of a choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamDelta {
    /// Visible text.
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning text.
    #[serde(default)]
    pub reasoning_content: Option<String>,
    /// Tool call argument fragments.
    #[serde(default)]
    pub tool_calls: Vec<ToolCallDelta>,
}

/// Fragment of one tool call, grouped by `index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallDelta {
    /// Stream slot for this call.
    #[serde(default)]
    pub index: u32,
    /// Call id, present on the first fragment.
    #[serde(default)]
    pub id: Option<String>,
    /// Tool name, present on the first fragment.
    #[serde(default)]
    pub name: Option<String>,
    /// Next piece of the JSON argument text.
    #[serde(default)]
    pub arguments: Option<String>,
}

impl StreamChunk {
    /// Chunk with a single index-0 text delta.
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self::single(StreamDelta {
            content: Some(text.into()),
            ..StreamDelta::default()
        })
    }

    /// Chunk with a single index-0 reasoning delta.
    #[must_use]
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::single(StreamDelta {
            reasoning_content: Some(text.into()),
            ..StreamDelta::default()
        })
    }

    /// Chunk with a single tool call fragment.
    #[must_use]
    pub fn tool_call(fragment: ToolCallDelta) -> Self {
        Self::single(StreamDelta {
            tool_calls: vec![fragment],
            ..StreamDelta::default()
        })
    }

    fn single(delta: StreamDelta) -> Self {
        Self {
            choices: vec![StreamChoice { index: 0, delta }],
        }
    }
}
