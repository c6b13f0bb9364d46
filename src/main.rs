#![forbid(unsafe_code)]

//! `acp-bridge` — ACP agent binary.
//!
//! Speaks the Agent Client Protocol on stdin/stdout and drives one agent
//! engine subprocess per session. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use acp_bridge::acp::{serve, AcpServer, Connection, PermissionConfirmer, ServerSettings};
use acp_bridge::config::GlobalConfig;
use acp_bridge::conversation::engine::EngineFactory;
use acp_bridge::models::mode::ConfirmationMode;
use acp_bridge::models::session::parse_session_id;
use acp_bridge::session::{RegistryConfig, SessionRegistry};
use acp_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "acp-bridge", about = "Agent Client Protocol session bridge", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Confirmation mode for new sessions (always-ask, always-approve, llm-approve).
    #[arg(long)]
    mode: Option<String>,

    /// Conversation id the first `session/new` resumes.
    #[arg(long)]
    resume: Option<String>,

    /// Emit token-level updates instead of one per event.
    #[arg(long)]
    streaming: bool,

    /// Override the default working directory for new sessions.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("acp-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;

    if let Some(ws) = args.workspace {
        let canonical = ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?;
        config.work_dir = canonical;
    }
    if let Some(raw) = args.mode.as_deref() {
        config.confirmation_mode = ConfirmationMode::parse(raw)
            .ok_or_else(|| AppError::Config(format!("unknown confirmation mode: {raw}")))?;
    }
    if args.streaming {
        config.streaming_enabled = true;
    }
    let resume_session = args
        .resume
        .as_deref()
        .map(parse_session_id)
        .transpose()?;

    if !config.is_agent_configured() {
        warn!(
            path = %config.agent_settings_path.display(),
            "agent settings not found; sessions cannot start until the agent is configured"
        );
    }

    let base_mcp_servers = config.load_mcp_servers()?;
    let config = Arc::new(config);
    info!(
        work_dir = %config.work_dir.display(),
        mode = config.confirmation_mode.id(),
        streaming = config.streaming_enabled,
        mcp_servers = base_mcp_servers.len(),
        "configuration loaded"
    );

    // ── Wire the client connection ──────────────────────
    let (connection, outbound) = Connection::new("client");
    let factory = Arc::new(EngineFactory::new(Arc::clone(&config)));
    let registry = Arc::new(SessionRegistry::new(
        RegistryConfig {
            default_working_dir: config.work_dir.clone(),
            base_mcp_servers,
            default_mode: config.confirmation_mode,
            streaming: config.streaming_enabled,
        },
        factory.clone(),
        connection.clone(),
    ));
    let server = AcpServer::new(
        connection.clone(),
        registry,
        factory,
        Arc::new(PermissionConfirmer::new(connection)),
        ServerSettings::from_config(&config, resume_session),
    );

    // ── Serve until stdin closes or a signal arrives ────
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    let result = serve(server, outbound, tokio::io::stdin(), tokio::io::stdout(), ct).await;
    if let Err(ref err) = result {
        error!(%err, "client connection failed");
    }
    info!("acp-bridge shut down");
    result
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
