//! ACP agent-side dispatcher.
//!
//! Every inbound request is handled on its own task so a long
//! `session/prompt` never blocks `session/cancel` or the permission
//! responses the prompt itself is waiting on. Responses to our own
//! requests are routed back to the pending map inline.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::commands::{
    available_commands, handle_confirm_argument, help_text, parse_slash_command,
    unknown_command_text, SlashCommand,
};
use super::connection::Connection;
use super::content::{prompt_to_message, single_text, PromptBlock};
use super::mcp::convert_mcp_servers;
use super::reader::{run_reader, RpcMessage};
use super::writer::run_writer;
use crate::config::{AuthConfig, GlobalConfig};
use crate::conversation::{Conversation, ConversationFactory};
use crate::errors::ErrorCategory;
use crate::models::mode::{ConfirmationMode, SessionModeState};
use crate::models::notification::{Notification, SessionUpdate};
use crate::models::session::parse_session_id;
use crate::session::{run_prompt, Confirmer, SessionRegistry, TaskGuard, TaskOutcome};
use crate::{AppError, Result};

/// ACP protocol version spoken by this agent.
pub const PROTOCOL_VERSION: u64 = 1;

/// Inbound queue depth between the reader and the dispatcher.
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// How long queued output may take to drain at shutdown.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Static settings the dispatcher needs besides the registry.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Agent name reported by `initialize`.
    pub agent_name: String,
    /// Agent version reported by `initialize`.
    pub agent_version: String,
    /// Settings file whose presence means the agent is configured.
    pub agent_settings_path: PathBuf,
    /// Mode reported for sessions the registry does not know yet.
    pub default_mode: ConfirmationMode,
    /// Grace period for a cancelled run cycle.
    pub cancel_timeout: Duration,
    /// Login routine for `authenticate`.
    pub auth: AuthConfig,
    /// Session id the first `session/new` resumes instead of creating.
    pub resume_session: Option<Uuid>,
}

impl ServerSettings {
    /// Settings derived from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig, resume_session: Option<Uuid>) -> Self {
        Self {
            agent_name: env!("CARGO_PKG_NAME").to_owned(),
            agent_version: env!("CARGO_PKG_VERSION").to_owned(),
            agent_settings_path: config.agent_settings_path.clone(),
            default_mode: config.confirmation_mode,
            cancel_timeout: Duration::from_secs(config.cancel_timeout_seconds),
            auth: config.auth.clone(),
            resume_session,
        }
    }

    fn is_agent_configured(&self) -> bool {
        self.agent_settings_path.is_file()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticateParams {
    method_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSessionParams {
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    mcp_servers: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadSessionParams {
    session_id: String,
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    mcp_servers: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptParams {
    session_id: String,
    #[serde(default)]
    prompt: Vec<PromptBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetModeParams {
    session_id: String,
    mode_id: String,
}

/// Dispatcher for one client connection. Cheap to clone.
#[derive(Clone)]
pub struct AcpServer {
    connection: Connection,
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn ConversationFactory>,
    confirmer: Arc<dyn Confirmer>,
    guard: TaskGuard,
    settings: Arc<ServerSettings>,
    resume_once: Arc<Mutex<Option<Uuid>>>,
}

impl std::fmt::Debug for AcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcpServer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AcpServer {
    /// Create a dispatcher.
    #[must_use]
    pub fn new(
        connection: Connection,
        registry: Arc<SessionRegistry>,
        factory: Arc<dyn ConversationFactory>,
        confirmer: Arc<dyn Confirmer>,
        settings: ServerSettings,
    ) -> Self {
        let resume_once = Arc::new(Mutex::new(settings.resume_session));
        Self {
            connection,
            registry,
            factory,
            confirmer,
            guard: TaskGuard::new(),
            settings: Arc::new(settings),
            resume_once,
        }
    }

    /// The session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The run-cycle guard.
    #[must_use]
    pub fn guard(&self) -> &TaskGuard {
        &self.guard
    }

    /// Handle one inbound message to completion.
    pub async fn handle(&self, message: RpcMessage) {
        match message {
            RpcMessage::Request { id, method, params } => {
                let span = info_span!("acp_request", %method, %id);
                self.handle_request(id, &method, params).instrument(span).await;
            }
            RpcMessage::Notification { method, params } => {
                self.handle_notification(&method, params).await;
            }
            RpcMessage::Response { id, result, error } => {
                self.connection.resolve_response(&id, result, error).await;
            }
        }
    }

    async fn handle_request(&self, id: Value, method: &str, params: Value) {
        let result = match method {
            "initialize" => Ok(self.initialize()),
            "authenticate" => self.authenticate(params).await,
            "session/new" => self.new_session(params).await,
            "session/load" => self.load_session(params).await,
            "session/prompt" => self.prompt(params).await,
            "session/set_mode" => self.set_mode(params).await,
            "session/set_model" => Ok(json!({})),
            "session/list" => Ok(json!({"sessions": self.registry.list().await})),
            "session/close" => self.close_session(params).await,
            "session/cancel" => self.cancel(params).await.map(|()| Value::Null),
            _ => {
                warn!(method, "unknown method");
                if let Err(err) = self.connection.respond_method_not_found(id, method) {
                    warn!(error = %err, "failed to send error response");
                }
                return;
            }
        };

        let sent = match result {
            Ok(value) => self.connection.respond(id, value),
            Err(err) => {
                warn!(method, error = %err, "request failed");
                self.connection.respond_error(id, &err)
            }
        };
        if let Err(err) = sent {
            warn!(method, error = %err, "failed to send response");
        }
    }

    async fn handle_notification(&self, method: &str, params: Value) {
        match method {
            "session/cancel" => {
                if let Err(err) = self.cancel(params).await {
                    warn!(error = %err, "cancel failed");
                }
            }
            _ => debug!(method, "ignoring notification"),
        }
    }

    fn initialize(&self) -> Value {
        let auth_methods = if self.settings.is_agent_configured() {
            self.auth_methods()
        } else {
            Vec::new()
        };
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "authMethods": auth_methods,
            "agentCapabilities": {
                "loadSession": true,
                "mcpCapabilities": {"http": true, "sse": true},
                "promptCapabilities": {"audio": false, "embeddedContext": true, "image": true},
            },
            "agentInfo": {
                "name": self.settings.agent_name,
                "version": self.settings.agent_version,
            },
        })
    }

    fn auth_methods(&self) -> Vec<Value> {
        let auth = &self.settings.auth;
        vec![
            json!({
                "id": "oauth",
                "name": "OAuth",
                "description": "Authenticate through agent",
            }),
            json!({
                "id": "terminal-login",
                "name": "Terminal login",
                "description": format!("Run `{} {}` in a terminal", auth.login_command, auth.login_args.join(" ")),
                "_meta": {
                    "terminal-auth": {
                        "command": auth.login_command,
                        "args": auth.login_args,
                        "label": "Agent login",
                    },
                },
            }),
            json!({
                "id": "api-key",
                "name": "API key",
                "description": format!("Set the {} environment variable", auth.api_key_env),
            }),
        ]
    }

    async fn authenticate(&self, params: Value) -> Result<Value> {
        let params: AuthenticateParams = parse_params(params)?;
        match params.method_id.as_str() {
            "oauth" | "terminal-login" => {
                self.run_login().await?;
                Ok(json!({}))
            }
            "api-key" => {
                if self.factory.is_authenticated().await {
                    Ok(json!({}))
                } else {
                    Err(AppError::AuthRequired(format!(
                        "no API key in the keychain or {}",
                        self.settings.auth.api_key_env
                    )))
                }
            }
            other => Err(AppError::InvalidInput(format!(
                "Unsupported authentication method: {other}"
            ))),
        }
    }

    async fn run_login(&self) -> Result<()> {
        let auth = &self.settings.auth;
        info!(command = %auth.login_command, "running login command");
        // stdout carries the protocol, so the child must not inherit it.
        let status = tokio::process::Command::new(&auth.login_command)
            .args(&auth.login_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|err| {
                AppError::AuthRequired(format!("failed to run {}: {err}", auth.login_command))
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(AppError::AuthRequired(format!(
                "{} exited with {status}",
                auth.login_command
            )))
        }
    }

    async fn new_session(&self, params: Value) -> Result<Value> {
        let params: NewSessionParams = parse_params(params)?;
        if !self.settings.is_agent_configured() {
            return Err(AppError::NotConfigured("Agent not configured".into()));
        }

        let mcp_servers = convert_mcp_servers(&params.mcp_servers);
        let resume_id = self.take_resume_id();
        let session_id = match resume_id {
            Some(session_id) => {
                info!(%session_id, "resuming session from command line");
                self.registry
                    .resume(session_id, params.cwd.as_deref(), Some(mcp_servers))
                    .await?;
                self.registry.replay_history(session_id).await?;
                session_id
            }
            None => {
                let session_id = Uuid::new_v4();
                self.registry
                    .get_or_create(session_id, params.cwd.as_deref(), Some(mcp_servers))
                    .await?;
                session_id
            }
        };

        self.send_available_commands(session_id);
        let mode = self.session_mode(session_id).await;
        Ok(json!({
            "sessionId": session_id.to_string(),
            "modes": SessionModeState::new(mode),
        }))
    }

    async fn load_session(&self, params: Value) -> Result<Value> {
        let params: LoadSessionParams = parse_params(params)?;
        let session_id = parse_session_id(&params.session_id)?;
        let mcp_servers = convert_mcp_servers(&params.mcp_servers);

        if self.registry.get(session_id).await.is_none() {
            self.registry
                .resume(session_id, params.cwd.as_deref(), Some(mcp_servers))
                .await?;
        }
        let replayed = self.registry.replay_history(session_id).await?;
        info!(%session_id, replayed, "session loaded");

        self.send_available_commands(session_id);
        let mode = self.session_mode(session_id).await;
        Ok(json!({"modes": SessionModeState::new(mode)}))
    }

    async fn prompt(&self, params: Value) -> Result<Value> {
        let params: PromptParams = parse_params(params)?;
        let session_id = parse_session_id(&params.session_id)?;

        match self.run_turn(session_id, &params.prompt).await {
            Ok(stop_reason) => Ok(json!({"stopReason": stop_reason})),
            Err(err) => {
                error!(%session_id, error = %err, "prompt failed");
                self.send_update(session_id, SessionUpdate::message(format!("Error: {err}")));
                match err.category() {
                    ErrorCategory::Internal => Err(AppError::Internal(format!(
                        "Failed to process prompt: {}",
                        err.reason()
                    ))),
                    ErrorCategory::InvalidInput | ErrorCategory::AuthRequired => Err(err),
                }
            }
        }
    }

    async fn run_turn(&self, session_id: Uuid, blocks: &[PromptBlock]) -> Result<&'static str> {
        let message = prompt_to_message(blocks);
        if message.is_empty() {
            debug!(%session_id, "empty prompt");
            return Ok("end_turn");
        }

        let conversation = self.live_conversation(session_id).await?;

        if let Some((name, argument)) = single_text(blocks).and_then(parse_slash_command) {
            info!(%session_id, command = %name, "slash command");
            let reply = self.slash_command(session_id, &name, &argument).await?;
            self.send_update(session_id, SessionUpdate::message(reply));
            return Ok("end_turn");
        }

        let confirmer = Arc::clone(&self.confirmer);
        let label = session_id.to_string();
        let outcome = self
            .guard
            .run(session_id, async move {
                run_prompt(&label, conversation.as_ref(), message, confirmer.as_ref()).await
            })
            .await?;

        Ok(match outcome {
            TaskOutcome::Completed(outcome) => outcome.stop_reason(),
            TaskOutcome::Cancelled => "cancelled",
        })
    }

    /// Cached handle, loaded from persistence when not cached and
    /// re-attached through resume when its engine died.
    async fn live_conversation(&self, session_id: Uuid) -> Result<Arc<dyn Conversation>> {
        let conversation = self.registry.get_or_load(session_id).await?;
        if conversation.is_alive() {
            return Ok(conversation);
        }
        warn!(%session_id, "conversation engine gone, resuming");
        self.registry.resume(session_id, None, None).await
    }

    async fn slash_command(&self, session_id: Uuid, name: &str, argument: &str) -> Result<String> {
        match SlashCommand::from_name(name) {
            Some(SlashCommand::Help) => Ok(help_text()),
            Some(SlashCommand::Confirm) => {
                let current = self.session_mode(session_id).await;
                let (reply, new_mode) = handle_confirm_argument(current, argument);
                if let Some(mode) = new_mode {
                    self.apply_mode(session_id, mode).await?;
                }
                Ok(reply)
            }
            None => Ok(unknown_command_text(name)),
        }
    }

    async fn set_mode(&self, params: Value) -> Result<Value> {
        let params: SetModeParams = parse_params(params)?;
        let session_id = parse_session_id(&params.session_id)?;
        let mode = ConfirmationMode::parse(&params.mode_id).ok_or_else(|| {
            AppError::InvalidInput(format!("Invalid mode ID: {}", params.mode_id))
        })?;
        self.apply_mode(session_id, mode).await?;
        Ok(json!({}))
    }

    async fn apply_mode(&self, session_id: Uuid, mode: ConfirmationMode) -> Result<()> {
        self.registry.set_mode(session_id, mode).await?;
        self.send_update(
            session_id,
            SessionUpdate::ModeState {
                current_mode_id: mode.id().to_owned(),
            },
        );
        Ok(())
    }

    async fn cancel(&self, params: Value) -> Result<()> {
        let params: SessionParams = parse_params(params)?;
        let session_id = parse_session_id(&params.session_id)?;
        let Some(conversation) = self.registry.get(session_id).await else {
            debug!(%session_id, "cancel for unknown session");
            return Ok(());
        };
        let stopped = self
            .guard
            .cancel(session_id, conversation.as_ref(), self.settings.cancel_timeout)
            .await?;
        info!(%session_id, stopped, "session cancelled");
        Ok(())
    }

    async fn close_session(&self, params: Value) -> Result<Value> {
        let params: SessionParams = parse_params(params)?;
        let session_id = parse_session_id(&params.session_id)?;
        if let Some(conversation) = self.registry.get(session_id).await {
            if self.guard.is_running(session_id) {
                self.guard
                    .cancel(session_id, conversation.as_ref(), self.settings.cancel_timeout)
                    .await?;
            }
        }
        self.registry.close(session_id).await?;
        self.guard.forget(session_id);
        Ok(json!({}))
    }

    async fn session_mode(&self, session_id: Uuid) -> ConfirmationMode {
        self.registry
            .mode(session_id)
            .await
            .unwrap_or(self.settings.default_mode)
    }

    fn send_available_commands(&self, session_id: Uuid) {
        self.send_update(
            session_id,
            SessionUpdate::AvailableCommands {
                available_commands: available_commands(),
            },
        );
    }

    fn send_update(&self, session_id: Uuid, update: SessionUpdate) {
        let notification = Notification::new(session_id.to_string(), update);
        if let Err(err) = self.connection.send_update(&notification) {
            warn!(%session_id, error = %err, "dropping session update");
        }
    }

    fn take_resume_id(&self) -> Option<Uuid> {
        self.resume_once
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params)
        .map_err(|err| AppError::InvalidInput(format!("invalid params: {err}")))
}

/// Serve one client until its input ends or `cancel` fires.
///
/// `outbound` is the receiver paired with the server's connection. At
/// shutdown every session is closed and queued output is given a bounded
/// time to drain.
///
/// # Errors
///
/// Returns the writer's error if the output stream failed.
pub async fn serve<R, W>(
    server: AcpServer,
    outbound: mpsc::UnboundedReceiver<Value>,
    input: R,
    output: W,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let peer = server.connection.peer().to_owned();
    let writer_cancel = CancellationToken::new();
    let mut writer = tokio::spawn(run_writer(
        peer.clone(),
        output,
        outbound,
        writer_cancel.clone(),
    ));

    let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
    let reader = tokio::spawn(run_reader(peer.clone(), input, inbound_tx, cancel.clone()));

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!(peer, "shutdown requested");
                break;
            }
            message = inbound_rx.recv() => {
                let Some(message) = message else {
                    info!(peer, "client input closed");
                    break;
                };
                if let RpcMessage::Response { .. } = message {
                    server.handle(message).await;
                    continue;
                }
                let server = server.clone();
                tokio::spawn(async move { server.handle(message).await });
            }
        }
    }

    reader.abort();
    server.registry.close_all().await;
    server.connection.fail_pending("client disconnected").await;
    drop(server);

    match tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, &mut writer).await {
        Ok(joined) => flatten_writer(joined),
        Err(_) => {
            debug!(peer, "output did not drain in time");
            writer_cancel.cancel();
            flatten_writer(writer.await)
        }
    }
}

fn flatten_writer(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined.map_err(|err| AppError::Internal(format!("writer task failed: {err}")))?
}
