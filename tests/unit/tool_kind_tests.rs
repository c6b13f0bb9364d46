//! Unit tests for tool kind, title and location derivation.

use acp_bridge::events::tool_kind::{
    display_title, is_view_command, tool_kind, tool_locations, tool_title,
};
use acp_bridge::models::notification::{ToolCallLocation, ToolKind};
use serde_json::{json, Map, Value};

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object")
}

// ── Kind ──────────────────────────────────────────────────────────────────────

#[test]
fn think_tool_is_think() {
    assert_eq!(tool_kind("think", None), ToolKind::Think);
}

#[test]
fn browser_tools_fetch() {
    assert_eq!(tool_kind("browser_navigate", None), ToolKind::Fetch);
    assert_eq!(tool_kind("browser_use", None), ToolKind::Fetch);
}

#[test]
fn file_editor_kind_follows_command() {
    let view = args(json!({"command": "view", "path": "/a"}));
    let edit = args(json!({"command": "str_replace", "path": "/a"}));
    assert_eq!(tool_kind("file_editor", Some(&view)), ToolKind::Read);
    assert_eq!(tool_kind("file_editor", Some(&edit)), ToolKind::Edit);
    assert_eq!(tool_kind("file_editor", None), ToolKind::Edit);
}

#[test]
fn view_prefixes_count_as_view() {
    for prefix in ["v", "vi", "vie", "view"] {
        assert!(is_view_command(prefix), "{prefix} should be a view prefix");
    }
    assert!(!is_view_command(""));
    assert!(!is_view_command("views"));
    assert!(!is_view_command("create"));
}

#[test]
fn table_and_fallback_kinds() {
    assert_eq!(tool_kind("terminal", None), ToolKind::Execute);
    assert_eq!(tool_kind("task_tracker", None), ToolKind::Other);
    assert_eq!(tool_kind("some_mcp_tool", None), ToolKind::Other);
}

// ── Title ─────────────────────────────────────────────────────────────────────

#[test]
fn titles_by_tool() {
    let read = args(json!({"command": "view", "path": "/src/main.rs"}));
    let write = args(json!({"command": "create", "path": "/src/new.rs"}));
    let shell = args(json!({"command": "ls -la"}));

    assert_eq!(tool_title("file_editor", Some(&read)), "Reading /src/main.rs");
    assert_eq!(tool_title("file_editor", Some(&write)), "Editing /src/new.rs");
    assert_eq!(tool_title("terminal", Some(&shell)), "ls -la");
    assert_eq!(tool_title("task_tracker", None), "Plan updated");
    assert_eq!(tool_title("terminal", None), "terminal");
}

#[test]
fn file_editor_without_command_is_editing() {
    let partial = args(json!({"path": "/x"}));
    assert_eq!(tool_title("file_editor", Some(&partial)), "Editing /x");
}

#[test]
fn summary_overrides_title() {
    let shell = args(json!({"command": "ls"}));
    assert_eq!(
        display_title("terminal", Some(&shell), Some("  List the repo ")),
        "List the repo"
    );
    assert_eq!(display_title("terminal", Some(&shell), Some("   ")), "ls");
}

// ── Locations ────────────────────────────────────────────────────────────────

#[test]
fn locations_for_file_editor_only() {
    let view = args(json!({"command": "view", "path": "/a.rs", "view_range": [10, 20]}));
    let insert = args(json!({"command": "insert", "path": "/b.rs", "insert_line": 7}));
    let plain = args(json!({"command": "create", "path": "/c.rs"}));

    assert_eq!(
        tool_locations("file_editor", Some(&view)),
        Some(vec![ToolCallLocation { path: "/a.rs".into(), line: Some(10) }])
    );
    assert_eq!(
        tool_locations("file_editor", Some(&insert)),
        Some(vec![ToolCallLocation { path: "/b.rs".into(), line: Some(7) }])
    );
    assert_eq!(
        tool_locations("file_editor", Some(&plain)),
        Some(vec![ToolCallLocation { path: "/c.rs".into(), line: None }])
    );
    assert_eq!(tool_locations("terminal", Some(&plain)), None);
}
