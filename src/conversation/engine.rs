//! Process-backed conversation: one agent engine subprocess per session.
//!
//! The engine speaks NDJSON JSON-RPC on its stdio. Requests go out through a
//! [`Connection`]; the engine's `conversation/event` and `conversation/token`
//! notifications are forwarded to the session's [`EventSink`] in the order
//! they were written, before the response of the request that produced them.
//!
//! | Request                               | Result                 |
//! |---------------------------------------|------------------------|
//! | `conversation/start`                  | `{status}`             |
//! | `conversation/status`                 | `{status}`             |
//! | `conversation/send_message`           | `{}`                   |
//! | `conversation/run`                    | `{status}`             |
//! | `conversation/pause`                  | `{}`                   |
//! | `conversation/set_confirmation_policy`| `{}`                   |
//! | `conversation/reject_pending`         | `{}`                   |
//! | `conversation/events`                 | `{events}`             |
//! | `conversation/close`                  | `{}`                   |

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::spawner::{monitor_exit, spawn_engine, EngineProcess, SpawnConfig};
use super::{Conversation, ConversationFactory, ConversationSpec, EventSink};
use crate::acp::connection::Connection;
use crate::acp::reader::{run_reader, RpcMessage};
use crate::acp::writer::run_writer;
use crate::config::GlobalConfig;
use crate::models::event::AgentEvent;
use crate::models::message::UserMessage;
use crate::models::mode::ConfirmationPolicy;
use crate::models::status::ExecutionStatus;
use crate::models::stream::StreamChunk;
use crate::{AppError, Result};

/// Grace period for the engine to acknowledge `conversation/close`.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Inbound channel depth between the engine reader and dispatcher.
const INBOUND_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
struct StatusResult {
    status: ExecutionStatus,
}

#[derive(Debug, Deserialize)]
struct EventsResult {
    #[serde(default)]
    events: Vec<AgentEvent>,
}

#[derive(Debug, Deserialize)]
struct EventParams {
    event: AgentEvent,
}

#[derive(Debug, Deserialize)]
struct TokenParams {
    chunk: StreamChunk,
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Launches engine-backed conversations from the global configuration.
#[derive(Debug, Clone)]
pub struct EngineFactory {
    config: Arc<GlobalConfig>,
}

impl EngineFactory {
    /// Create a factory.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>) -> Self {
        Self { config }
    }

    async fn launch(
        &self,
        spec: ConversationSpec,
        sink: Arc<dyn EventSink>,
    ) -> Result<Arc<dyn Conversation>> {
        if !self.config.is_agent_configured() {
            return Err(AppError::NotConfigured(format!(
                "agent settings not found at {}",
                self.config.agent_settings_path.display()
            )));
        }

        let mut extra_env = Vec::new();
        if let Some(key) = self.config.load_api_key().await? {
            extra_env.push((self.config.auth.api_key_env.clone(), key));
        }

        let spawn = SpawnConfig {
            command: self.config.engine.command.clone(),
            args: self.config.engine.args.clone(),
            working_dir: spec.working_dir.clone(),
            startup_timeout: Duration::from_secs(self.config.engine.startup_timeout_seconds),
            extra_env,
        };
        let session_id = spec.conversation_id.to_string();
        let process = spawn_engine(&spawn, &session_id).await?;
        let conversation = EngineConversation::attach(spec.conversation_id, process, sink);

        let start = tokio::time::timeout(
            spawn.startup_timeout,
            conversation.call(
                "conversation/start",
                json!({
                    "conversationId": session_id,
                    "workingDir": spec.working_dir,
                    "persistenceDir": self.config.conversations_dir,
                    "mcpServers": spec.mcp_servers,
                    "resume": spec.resume,
                    "streaming": spec.streaming,
                }),
            ),
        )
        .await
        .unwrap_or_else(|_| {
            Err(AppError::Engine(format!(
                "conversation/start timed out after {}s",
                spawn.startup_timeout.as_secs()
            )))
        });
        if let Err(err) = start {
            warn!(session_id, error = %err, "engine rejected conversation/start");
            if let Err(close_err) = conversation.close().await {
                debug!(session_id, error = %close_err, "engine close after failed start");
            }
            return Err(err);
        }

        info!(session_id, resume = spec.resume, "engine conversation ready");
        Ok(Arc::new(conversation))
    }
}

impl ConversationFactory for EngineFactory {
    fn start_or_load(
        &self,
        spec: ConversationSpec,
        sink: Arc<dyn EventSink>,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn Conversation>>> + Send + '_>> {
        let span = info_span!("engine_start", session_id = %spec.conversation_id);
        Box::pin(self.launch(spec, sink).instrument(span))
    }

    fn is_authenticated(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            match self.config.load_api_key().await {
                Ok(key) => key.is_some(),
                Err(err) => {
                    warn!(error = %err, "credential lookup failed");
                    false
                }
            }
        })
    }
}

// ── Conversation ─────────────────────────────────────────────────────────────

/// A conversation living in an engine subprocess.
#[derive(Debug)]
pub struct EngineConversation {
    id: Uuid,
    connection: Connection,
    alive: Arc<AtomicBool>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl EngineConversation {
    /// Wire up reader, writer, dispatcher and exit monitor for a spawned
    /// engine.
    #[must_use]
    pub fn attach(id: Uuid, process: EngineProcess, sink: Arc<dyn EventSink>) -> Self {
        let session_id = id.to_string();
        let (connection, outbound_rx) = Connection::new("engine");
        let cancel = CancellationToken::new();
        let alive = Arc::new(AtomicBool::new(true));

        let writer_peer = format!("engine:{session_id}");
        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) =
                run_writer(writer_peer.clone(), process.stdin, outbound_rx, writer_cancel).await
            {
                warn!(peer = writer_peer, error = %err, "engine writer stopped");
            }
        });

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let reader_peer = format!("engine:{session_id}");
        tokio::spawn(run_reader(
            reader_peer,
            process.stdout,
            inbound_tx,
            cancel.clone(),
        ));

        tokio::spawn(dispatch_engine_messages(
            session_id.clone(),
            inbound_rx,
            connection.clone(),
            sink,
        ));

        // Detached: the monitor ends with the engine or on cancellation.
        drop(monitor_exit(
            session_id,
            process.child,
            Arc::clone(&alive),
            connection.clone(),
            cancel.clone(),
        ));

        Self {
            id,
            connection,
            alive,
            closed: AtomicBool::new(false),
            cancel,
        }
    }

    /// Send a request; a dead engine or a dropped stream is transient.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        if !self.is_alive() {
            return Err(AppError::Transient("engine is not running".into()));
        }
        self.connection
            .request(method, params)
            .await
            .map_err(|err| match err {
                AppError::Acp(msg) => AppError::Transient(msg),
                other => other,
            })
    }

    async fn call_status(&self, method: &str) -> Result<ExecutionStatus> {
        let result = self.call(method, json!({})).await?;
        let parsed: StatusResult = serde_json::from_value(result)
            .map_err(|e| AppError::Engine(format!("invalid {method} result: {e}")))?;
        Ok(parsed.status)
    }
}

impl Conversation for EngineConversation {
    fn id(&self) -> Uuid {
        self.id
    }

    fn execution_status(&self) -> Pin<Box<dyn Future<Output = Result<ExecutionStatus>> + Send + '_>> {
        Box::pin(self.call_status("conversation/status"))
    }

    fn send_message(
        &self,
        message: UserMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.call("conversation/send_message", json!({ "message": message }))
                .await
                .map(drop)
        })
    }

    fn run_one_cycle(&self) -> Pin<Box<dyn Future<Output = Result<ExecutionStatus>> + Send + '_>> {
        Box::pin(self.call_status("conversation/run"))
    }

    fn pause(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { self.call("conversation/pause", json!({})).await.map(drop) })
    }

    fn set_confirmation_policy(
        &self,
        policy: ConfirmationPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.call(
                "conversation/set_confirmation_policy",
                json!({ "policy": policy }),
            )
            .await
            .map(drop)
        })
    }

    fn reject_pending(
        &self,
        reason: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.call("conversation/reject_pending", json!({ "reason": reason }))
                .await
                .map(drop)
        })
    }

    fn events(&self) -> Pin<Box<dyn Future<Output = Result<Vec<AgentEvent>>> + Send + '_>> {
        Box::pin(async move {
            let result = self.call("conversation/events", json!({})).await?;
            let parsed: EventsResult = serde_json::from_value(result)
                .map_err(|e| AppError::Engine(format!("invalid conversation/events result: {e}")))?;
            Ok(parsed.events)
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.cancel.is_cancelled()
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            if self.is_alive() {
                match tokio::time::timeout(
                    CLOSE_TIMEOUT,
                    self.connection.request("conversation/close", json!({})),
                )
                .await
                {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => debug!(session_id = %self.id, error = %err, "engine close failed"),
                    Err(_) => debug!(session_id = %self.id, "engine close timed out"),
                }
            }
            self.cancel.cancel();
            self.connection.fail_pending("conversation closed").await;
            Ok(())
        })
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

/// Route engine output: responses to their requesters, events and tokens to
/// the sink, strictly in arrival order.
async fn dispatch_engine_messages(
    session_id: String,
    mut inbound_rx: mpsc::Receiver<RpcMessage>,
    connection: Connection,
    sink: Arc<dyn EventSink>,
) {
    while let Some(message) = inbound_rx.recv().await {
        match message {
            RpcMessage::Response { id, result, error } => {
                connection.resolve_response(&id, result, error).await;
            }
            RpcMessage::Notification { method, params } => match method.as_str() {
                "conversation/event" => match serde_json::from_value::<EventParams>(params) {
                    Ok(parsed) => sink.on_event(&parsed.event),
                    Err(err) => warn!(session_id, error = %err, "malformed engine event"),
                },
                "conversation/token" => match serde_json::from_value::<TokenParams>(params) {
                    Ok(parsed) => sink.on_token(&parsed.chunk),
                    Err(err) => warn!(session_id, error = %err, "malformed engine token"),
                },
                other => debug!(session_id, method = other, "ignoring engine notification"),
            },
            RpcMessage::Request { id, method, .. } => {
                warn!(session_id, method, "engine sent an unsupported request");
                if let Err(err) = connection.respond_method_not_found(id, &method) {
                    debug!(session_id, error = %err, "engine connection closed");
                }
            }
        }
    }

    debug!(session_id, "engine stream closed");
    connection.fail_pending("engine stream closed").await;
}
