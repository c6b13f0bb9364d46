//! Conversion of `session/new` MCP server declarations into the engine's
//! name-keyed format.

use serde_json::{Map, Value};
use tracing::warn;

/// Convert ACP MCP servers (an array of named entries) into a map keyed by
/// server name.
///
/// `env` and `headers` arrays of `{name, value}` pairs become objects and
/// every entry gains a `transport` of `stdio`, `http` or `sse`. Entries
/// without a name are skipped.
#[must_use]
pub fn convert_mcp_servers(servers: &[Value]) -> Map<String, Value> {
    let mut converted = Map::new();
    for server in servers {
        let Some(entry) = server.as_object() else {
            warn!(%server, "ignoring non-object mcp server entry");
            continue;
        };
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            warn!(%server, "ignoring mcp server without a name");
            continue;
        };

        let mut config = Map::new();
        for (key, value) in entry {
            match key.as_str() {
                "name" | "type" => {}
                "env" | "headers" => {
                    config.insert(key.clone(), pairs_to_object(value));
                }
                _ => {
                    config.insert(key.clone(), value.clone());
                }
            }
        }
        config.insert("transport".into(), Value::String(transport(entry).into()));
        converted.insert(name.to_owned(), Value::Object(config));
    }
    converted
}

fn transport(entry: &Map<String, Value>) -> &'static str {
    match entry.get("type").and_then(Value::as_str) {
        Some("http") => "http",
        Some("sse") => "sse",
        _ => "stdio",
    }
}

fn pairs_to_object(value: &Value) -> Value {
    let Some(pairs) = value.as_array() else {
        return value.clone();
    };
    let object = pairs
        .iter()
        .filter_map(|pair| {
            let name = pair.get("name")?.as_str()?;
            let value = pair.get("value")?.clone();
            Some((name.to_owned(), value))
        })
        .collect();
    Value::Object(object)
}
