//! Engine process spawner.
//!
//! Launches one agent engine per session with:
//! - `kill_on_drop(true)` so an abandoned engine dies with its handle.
//! - `env_clear()` plus an allowlist, so the editor's environment does not
//!   leak into the engine; the API credential is injected explicitly.
//! - A startup timeout on the engine's ready line (its first stdout line).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acp::connection::Connection;
use crate::{AppError, Result};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the engine process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    "LANG",
    "TERM",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// Variable carrying the session id into the engine.
pub const SESSION_ENV_VAR: &str = "ACP_BRIDGE_SESSION_ID";

// ── Configuration ────────────────────────────────────────────────────────────

/// How to launch an engine.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Engine binary.
    pub command: String,
    /// Engine arguments.
    pub args: Vec<String>,
    /// Directory the engine starts in.
    pub working_dir: PathBuf,
    /// Maximum wait for the ready line.
    pub startup_timeout: Duration,
    /// Extra variables set on top of the allowlist.
    pub extra_env: Vec<(String, String)>,
}

/// Stdio of a running engine.
#[derive(Debug)]
pub struct EngineProcess {
    /// Child handle; dropping it kills the engine.
    pub child: Child,
    /// Engine stdin for requests.
    pub stdin: ChildStdin,
    /// Engine stdout, positioned after the ready line.
    pub stdout: BufReader<ChildStdout>,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn an engine and wait for its ready line.
///
/// # Errors
///
/// - `AppError::Engine("failed to spawn engine: …")` on OS spawn failure.
/// - `AppError::Engine("startup timeout …")` if no line arrives in time.
/// - `AppError::Engine("engine exited before ready signal")` on early EOF.
pub async fn spawn_engine(config: &SpawnConfig, session_id: &str) -> Result<EngineProcess> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }
    for (key, val) in &config.extra_env {
        cmd.env(key, val);
    }
    cmd.env(SESSION_ENV_VAR, session_id);

    cmd.current_dir(&config.working_dir)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Engine(format!("failed to spawn engine: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Engine("failed to capture engine stdin".into()))?;
    let stdout_raw = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Engine("failed to capture engine stdout".into()))?;

    let mut reader = BufReader::new(stdout_raw);
    let mut line = String::new();

    match tokio::time::timeout(config.startup_timeout, reader.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => {
            info!(session_id, ready_line = line.trim(), "engine emitted ready signal");
        }
        Ok(Ok(_)) => {
            return Err(AppError::Engine("engine exited before ready signal".into()));
        }
        Ok(Err(err)) => {
            return Err(AppError::Engine(format!(
                "failed to read engine ready signal: {err}"
            )));
        }
        Err(_elapsed) => {
            child.kill().await.ok();
            return Err(AppError::Engine(format!(
                "startup timeout: engine did not emit ready signal within {:?}",
                config.startup_timeout
            )));
        }
    }

    Ok(EngineProcess {
        child,
        stdin,
        stdout: reader,
    })
}

// ── Exit monitor ─────────────────────────────────────────────────────────────

/// Watch the engine until it exits or `cancel` fires.
///
/// On exit the handle is marked dead and every in-flight request fails, so
/// a caller blocked on `conversation/run` sees an error instead of hanging.
/// On cancellation the child is dropped, which kills it.
#[must_use]
pub fn monitor_exit(
    session_id: String,
    mut child: Child,
    alive: Arc<AtomicBool>,
    connection: Connection,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let reason = match result {
                    Ok(status) => status.code().map_or_else(
                        || "engine terminated by signal".to_owned(),
                        |c| format!("engine exited with code {c}"),
                    ),
                    Err(err) => {
                        warn!(session_id, %err, "error waiting for engine process");
                        format!("wait error: {err}")
                    }
                };
                alive.store(false, Ordering::SeqCst);
                warn!(session_id, reason, "engine process ended");
                connection.fail_pending(&reason).await;
            }
            () = cancel.cancelled() => {
                alive.store(false, Ordering::SeqCst);
                info!(session_id, "engine monitor: cancellation received, stopping engine");
            }
        }
    })
}
