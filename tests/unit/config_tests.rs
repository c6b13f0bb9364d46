use acp_bridge::models::mode::ConfirmationMode;
use acp_bridge::{config::GlobalConfig, AppError};

fn sample_toml(root: &str) -> String {
    format!(
        r#"
work_dir = '{root}'
agent_settings_path = '{root}/agent_settings.json'
conversations_dir = '{root}/conversations'
mcp_config_path = '{root}/mcp.json'
confirmation_mode = "llm-approve"
streaming_enabled = true
cancel_timeout_seconds = 3

[engine]
command = "agent-engine"
args = ["--stdio"]
startup_timeout_seconds = 5

[auth]
login_command = "agent"
login_args = ["login", "--device"]
api_key_env = "MY_AGENT_KEY"
"#
    )
}

fn minimal_toml(root: &str) -> String {
    format!(
        r#"
work_dir = '{root}'
agent_settings_path = '{root}/agent_settings.json'
conversations_dir = '{root}/conversations'

[engine]
command = "agent-engine"
"#
    )
}

#[test]
fn parses_valid_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = GlobalConfig::from_toml_str(&sample_toml(root)).expect("config parses");

    assert_eq!(config.confirmation_mode, ConfirmationMode::LlmApprove);
    assert!(config.streaming_enabled);
    assert_eq!(config.cancel_timeout_seconds, 3);
    assert_eq!(config.engine.args, vec!["--stdio".to_owned()]);
    assert_eq!(config.engine.startup_timeout_seconds, 5);
    assert_eq!(config.auth.login_args, vec!["login".to_owned(), "--device".to_owned()]);
    assert_eq!(config.auth.api_key_env, "MY_AGENT_KEY");
    assert_eq!(config.work_dir, temp.path().canonicalize().unwrap());
}

#[test]
fn defaults_apply_to_minimal_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = GlobalConfig::from_toml_str(&minimal_toml(root)).expect("config parses");

    assert_eq!(config.confirmation_mode, ConfirmationMode::AlwaysAsk);
    assert!(!config.streaming_enabled);
    assert_eq!(config.cancel_timeout_seconds, 10);
    assert_eq!(config.engine.startup_timeout_seconds, 30);
    assert!(config.engine.args.is_empty());
    assert_eq!(config.auth.login_command, "agent");
    assert_eq!(config.auth.api_key_env, "AGENT_API_KEY");
    assert!(config.mcp_config_path.is_none());
}

#[test]
fn rejects_relative_work_dir() {
    let toml = minimal_toml("relative/dir");
    let err = GlobalConfig::from_toml_str(&toml).expect_err("relative dir rejected");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("absolute")));
}

#[test]
fn rejects_empty_engine_command() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let toml = minimal_toml(root).replace("\"agent-engine\"", "\"  \"");
    let err = GlobalConfig::from_toml_str(&toml).expect_err("empty command rejected");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("engine.command")));
}

#[test]
fn rejects_zero_cancel_timeout() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let toml = format!("cancel_timeout_seconds = 0\n{}", minimal_toml(root));
    let err = GlobalConfig::from_toml_str(&toml).expect_err("zero timeout rejected");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn rejects_unknown_mode() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let toml = format!("confirmation_mode = \"sometimes\"\n{}", minimal_toml(root));
    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn malformed_toml_is_config_error() {
    let err = GlobalConfig::from_toml_str("work_dir = ").expect_err("invalid toml");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn agent_configured_tracks_settings_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = GlobalConfig::from_toml_str(&minimal_toml(root)).expect("config parses");
    assert!(!config.is_agent_configured());

    std::fs::write(temp.path().join("agent_settings.json"), "{}").unwrap();
    assert!(config.is_agent_configured());
}

#[test]
fn load_from_path_reads_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, minimal_toml(root)).unwrap();
    assert!(GlobalConfig::load_from_path(&path).is_ok());

    let missing = GlobalConfig::load_from_path(temp.path().join("nope.toml"));
    assert!(matches!(missing, Err(AppError::Config(_))));
}

// ── MCP server file ──────────────────────────────────────────────────────────

#[test]
fn mcp_servers_load_from_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = GlobalConfig::from_toml_str(&sample_toml(root)).expect("config parses");

    assert!(config.load_mcp_servers().unwrap().is_empty(), "absent file is empty");

    std::fs::write(
        temp.path().join("mcp.json"),
        r#"{"mcpServers": {"fetch": {"command": "uvx", "args": ["mcp-server-fetch"]}}}"#,
    )
    .unwrap();
    let servers = config.load_mcp_servers().unwrap();
    assert!(servers.contains_key("fetch"));
}

#[test]
fn malformed_mcp_file_is_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().to_str().expect("utf8 path");
    let config = GlobalConfig::from_toml_str(&sample_toml(root)).expect("config parses");

    std::fs::write(temp.path().join("mcp.json"), r#"{"mcpServers": ["#).unwrap();
    let err = config.load_mcp_servers().expect_err("bad json");
    assert!(err.hint().is_some());

    std::fs::write(temp.path().join("mcp.json"), r#"{"mcpServers": []}"#).unwrap();
    assert!(config.load_mcp_servers().is_err());
}
