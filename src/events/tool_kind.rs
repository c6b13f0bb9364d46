//! Tool title, kind and location derivation shared by the batched and
//! streaming paths.

use serde_json::{Map, Value};

use crate::models::event::{FILE_EDITOR_TOOL, TASK_TRACKER_TOOL, TERMINAL_TOOL, THINK_TOOL};
use crate::models::notification::{ToolCallLocation, ToolKind};

/// Static fallback table, consulted after the special cases.
const KIND_TABLE: &[(&str, ToolKind)] = &[
    ("terminal", ToolKind::Execute),
    ("browser_use", ToolKind::Fetch),
    ("browser", ToolKind::Fetch),
];

/// Whether `command` selects the file editor's read-only mode.
///
/// Streaming may deliver `v`, `vi` or `vie` before the full word, so any
/// non-empty prefix of `view` counts.
#[must_use]
pub fn is_view_command(command: &str) -> bool {
    !command.is_empty() && "view".starts_with(command)
}

/// Kind for a tool call. First match wins.
#[must_use]
pub fn tool_kind(tool_name: &str, arguments: Option<&Map<String, Value>>) -> ToolKind {
    if tool_name == THINK_TOOL {
        return ToolKind::Think;
    }
    if tool_name.starts_with("browser") {
        return ToolKind::Fetch;
    }
    if tool_name == FILE_EDITOR_TOOL {
        let command = arguments.and_then(|args| str_arg(args, "command"));
        return match command {
            Some(command) if is_view_command(command) => ToolKind::Read,
            _ => ToolKind::Edit,
        };
    }

    KIND_TABLE
        .iter()
        .find(|(name, _)| *name == tool_name)
        .map_or(ToolKind::Other, |(_, kind)| *kind)
}

/// Title derived from the tool name and whatever arguments are known.
#[must_use]
pub fn tool_title(tool_name: &str, arguments: Option<&Map<String, Value>>) -> String {
    if tool_name == TASK_TRACKER_TOOL {
        return "Plan updated".to_owned();
    }
    let Some(args) = arguments else {
        return tool_name.to_owned();
    };

    match tool_name {
        FILE_EDITOR_TOOL => {
            if let Some(path) = str_arg(args, "path").filter(|path| !path.is_empty()) {
                return match str_arg(args, "command") {
                    Some(command) if is_view_command(command) => format!("Reading {path}"),
                    _ => format!("Editing {path}"),
                };
            }
        }
        TERMINAL_TOOL => {
            if let Some(command) = str_arg(args, "command").filter(|c| !c.is_empty()) {
                return command.to_owned();
            }
        }
        _ => {}
    }
    tool_name.to_owned()
}

/// Title with an LLM summary taking precedence when present.
#[must_use]
pub fn display_title(
    tool_name: &str,
    arguments: Option<&Map<String, Value>>,
    summary: Option<&str>,
) -> String {
    match summary.map(str::trim).filter(|s| !s.is_empty()) {
        Some(summary) => summary.to_owned(),
        None => tool_title(tool_name, arguments),
    }
}

/// File locations for file editor calls; line comes from `view_range[0]`
/// or `insert_line`.
#[must_use]
pub fn tool_locations(
    tool_name: &str,
    arguments: Option<&Map<String, Value>>,
) -> Option<Vec<ToolCallLocation>> {
    if tool_name != FILE_EDITOR_TOOL {
        return None;
    }
    let args = arguments?;
    let path = str_arg(args, "path").filter(|path| !path.is_empty())?;

    let line = args
        .get("view_range")
        .and_then(Value::as_array)
        .and_then(|range| range.first())
        .and_then(Value::as_u64)
        .or_else(|| args.get("insert_line").and_then(Value::as_u64));

    Some(vec![ToolCallLocation {
        path: path.to_owned(),
        line,
    }])
}

fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}
