//! Unit tests for pending-action extraction.

use acp_bridge::models::event::AgentEvent;
use acp_bridge::session::confirmation::unmatched_actions;
use serde_json::{json, Value};

fn event(value: Value) -> AgentEvent {
    serde_json::from_value(value).expect("valid event")
}

fn user(text: &str) -> AgentEvent {
    event(json!({"kind": "message", "id": format!("u-{text}"), "source": "user", "text": text}))
}

fn action(call: &str, command: &str) -> AgentEvent {
    event(json!({
        "kind": "action", "id": format!("a-{call}"), "tool_call_id": call,
        "tool_name": "terminal", "arguments": {"command": command},
    }))
}

fn output(call: &str) -> AgentEvent {
    event(json!({
        "kind": "observation", "id": format!("o-{call}"), "tool_call_id": call,
        "tool_name": "terminal", "observation": {"type": "output", "text": ""},
    }))
}

#[test]
fn unmatched_actions_oldest_first() {
    let log = vec![user("go"), action("c1", "ls"), action("c2", "pwd")];
    let pending = unmatched_actions(&log);
    let ids: Vec<_> = pending.iter().map(|action| action.tool_call_id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c2"]);
    assert_eq!(pending[0].title, "ls");
    assert_eq!(pending[0].action_id, "a-c1");
}

#[test]
fn observed_actions_are_not_pending() {
    let log = vec![user("go"), action("c1", "ls"), output("c1"), action("c2", "pwd")];
    let pending = unmatched_actions(&log);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tool_call_id, "c2");
}

#[test]
fn scan_stops_at_latest_user_message() {
    let log = vec![
        user("first"),
        action("old", "rm -rf build"),
        user("second"),
        action("new", "cargo fmt"),
    ];
    let pending = unmatched_actions(&log);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].tool_call_id, "new");
}

#[test]
fn empty_log_has_nothing_pending() {
    assert!(unmatched_actions(&[]).is_empty());
    assert!(unmatched_actions(&[user("hi")]).is_empty());
}
