//! Conversion of ACP prompt content blocks into a [`UserMessage`].

use serde::Deserialize;

use crate::models::message::{MessagePart, UserMessage};

/// Image MIME types the agent accepts inline.
pub const SUPPORTED_IMAGE_MIME_TYPES: [&str; 4] =
    ["image/gif", "image/jpeg", "image/png", "image/webp"];

const CONTEXT_BEGIN: &str = "\n[BEGIN USER PROVIDED ADDITIONAL CONTEXT]\n";
const CONTEXT_END: &str = "[END USER PROVIDED ADDITIONAL CONTEXT]\n";

/// One block of a `session/prompt` request.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromptBlock {
    /// Plain text.
    Text {
        /// Body.
        text: String,
    },
    /// Base64 image.
    #[serde(rename_all = "camelCase")]
    Image {
        /// Base64 payload.
        data: String,
        /// Image MIME type.
        mime_type: String,
    },
    /// Audio; the agent cannot consume it.
    Audio {},
    /// Link to a resource the client did not inline.
    #[serde(rename_all = "camelCase")]
    ResourceLink {
        /// Resource URI.
        uri: String,
        /// Display name.
        #[serde(default)]
        name: Option<String>,
        /// MIME type, if known.
        #[serde(default)]
        mime_type: Option<String>,
    },
    /// Inlined resource contents.
    Resource {
        /// Text or blob contents.
        resource: EmbeddedResource,
    },
    /// Block types added to the protocol later.
    #[serde(other)]
    Unsupported,
}

/// Contents of an embedded resource.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    /// Resource URI.
    pub uri: String,
    /// Text contents.
    #[serde(default)]
    pub text: Option<String>,
    /// Base64 contents.
    #[serde(default)]
    pub blob: Option<String>,
    /// MIME type, if known.
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Build the user message for a prompt. Audio and unknown blocks are
/// dropped.
#[must_use]
pub fn prompt_to_message(blocks: &[PromptBlock]) -> UserMessage {
    let parts = blocks.iter().filter_map(block_to_part).collect();
    UserMessage { parts }
}

/// Text of a prompt consisting of exactly one text block.
#[must_use]
pub fn single_text(blocks: &[PromptBlock]) -> Option<&str> {
    match blocks {
        [PromptBlock::Text { text }] => Some(text),
        _ => None,
    }
}

fn block_to_part(block: &PromptBlock) -> Option<MessagePart> {
    match block {
        PromptBlock::Text { text } => Some(MessagePart::Text { text: text.clone() }),
        PromptBlock::Image { data, mime_type } => Some(image_part(data, mime_type)),
        PromptBlock::ResourceLink {
            uri,
            name,
            mime_type,
        } => {
            let mut body = format!(
                "The user referenced a resource: {}\nURI: {uri}\n",
                name.as_deref().unwrap_or(uri)
            );
            if let Some(mime_type) = mime_type {
                body.push_str(&format!("MIME type: {mime_type}\n"));
            }
            Some(context_block(&body))
        }
        PromptBlock::Resource { resource } => Some(context_block(&embedded_body(resource))),
        PromptBlock::Audio {} | PromptBlock::Unsupported => None,
    }
}

fn image_part(data: &str, mime_type: &str) -> MessagePart {
    if SUPPORTED_IMAGE_MIME_TYPES.contains(&mime_type) {
        return MessagePart::Image {
            url: format!("data:{mime_type};base64,{data}"),
        };
    }
    context_block(&format!(
        "User provided image with unsupported format ({mime_type}).\nSupported formats: {}\n",
        SUPPORTED_IMAGE_MIME_TYPES.join(", ")
    ))
}

fn embedded_body(resource: &EmbeddedResource) -> String {
    match (&resource.text, &resource.blob) {
        (Some(text), _) => format!("File: {}\n{text}\n", resource.uri),
        (None, Some(_)) => format!(
            "The user attached binary content ({}) from {}; it is not shown inline.\n",
            resource.mime_type.as_deref().unwrap_or("unknown type"),
            resource.uri
        ),
        (None, None) => format!("File: {}\n", resource.uri),
    }
}

fn context_block(body: &str) -> MessagePart {
    MessagePart::Text {
        text: format!("{CONTEXT_BEGIN}{body}{CONTEXT_END}"),
    }
}
