//! Unit tests for prompt content conversion.

use acp_bridge::acp::content::{prompt_to_message, single_text, PromptBlock};
use acp_bridge::models::message::MessagePart;
use serde_json::json;

fn blocks(value: serde_json::Value) -> Vec<PromptBlock> {
    serde_json::from_value(value).expect("valid prompt")
}

#[test]
fn text_blocks_pass_through() {
    let prompt = blocks(json!([{"type": "text", "text": "list files"}]));
    let message = prompt_to_message(&prompt);
    assert_eq!(message.plain_text(), "list files");
    assert_eq!(single_text(&prompt), Some("list files"));
}

#[test]
fn supported_images_become_data_urls() {
    let prompt = blocks(json!([{"type": "image", "data": "AAAA", "mimeType": "image/png"}]));
    let message = prompt_to_message(&prompt);
    assert_eq!(
        message.parts,
        vec![MessagePart::Image { url: "data:image/png;base64,AAAA".into() }]
    );
    assert!(!message.is_empty());
}

#[test]
fn unsupported_images_become_context_note() {
    let prompt = blocks(json!([{"type": "image", "data": "AAAA", "mimeType": "image/tiff"}]));
    let text = prompt_to_message(&prompt).plain_text();
    assert!(text.contains("[BEGIN USER PROVIDED ADDITIONAL CONTEXT]"));
    assert!(text.contains("image/tiff"));
    assert!(text.contains("[END USER PROVIDED ADDITIONAL CONTEXT]"));
}

#[test]
fn resources_become_context_blocks() {
    let prompt = blocks(json!([
        {"type": "resource_link", "uri": "file:///repo/a.rs", "name": "a.rs"},
        {"type": "resource", "resource": {"uri": "file:///repo/b.rs", "text": "fn main() {}"}},
    ]));
    let message = prompt_to_message(&prompt);
    assert_eq!(message.parts.len(), 2);
    let text = message.plain_text();
    assert!(text.contains("a.rs"));
    assert!(text.contains("fn main() {}"));
    assert!(single_text(&prompt).is_none());
}

#[test]
fn audio_and_unknown_blocks_are_dropped() {
    let prompt = blocks(json!([
        {"type": "audio", "data": "AAAA", "mimeType": "audio/wav"},
        {"type": "hologram"},
    ]));
    let message = prompt_to_message(&prompt);
    assert!(message.parts.is_empty());
    assert!(message.is_empty());
}

#[test]
fn whitespace_only_prompt_is_empty() {
    let prompt = blocks(json!([{"type": "text", "text": "   "}]));
    assert!(prompt_to_message(&prompt).is_empty());
}
