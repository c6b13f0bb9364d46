//! Boundary with the external agent conversation.
//!
//! The session layer never reasons or executes tools itself. It drives a
//! [`Conversation`] (start or load, send message, run one cycle, pause, set
//! policy, read the event log) and receives the conversation's output
//! through an [`EventSink`]. [`engine`] provides the process-backed
//! implementation used in production.

pub mod engine;
pub mod spawner;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::event::AgentEvent;
use crate::models::message::UserMessage;
use crate::models::mode::ConfirmationPolicy;
use crate::models::status::ExecutionStatus;
use crate::models::stream::StreamChunk;
use crate::Result;

/// Everything needed to start or load one conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSpec {
    /// Conversation id; equal to the ACP session id.
    pub conversation_id: Uuid,
    /// Directory the agent works in.
    pub working_dir: PathBuf,
    /// MCP servers keyed by name, in the engine's format.
    pub mcp_servers: Map<String, Value>,
    /// Load the persisted conversation instead of starting empty.
    pub resume: bool,
    /// Ask the engine to emit token deltas.
    pub streaming: bool,
}

/// Receiver of a conversation's output.
///
/// Called synchronously from the conversation's delivery path, in the order
/// the conversation produced the items.
pub trait EventSink: Send + Sync {
    /// A complete event was appended to the log.
    fn on_event(&self, event: &AgentEvent);

    /// A streamed token chunk arrived.
    fn on_token(&self, chunk: &StreamChunk);
}

/// A live conversation handle.
///
/// The handle is single-writer per session; the task guard serializes run
/// cycles, the handle itself does no locking on behalf of callers.
pub trait Conversation: Send + Sync {
    /// Conversation id.
    fn id(&self) -> Uuid;

    /// Current execution status.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached.
    fn execution_status(&self) -> Pin<Box<dyn Future<Output = Result<ExecutionStatus>> + Send + '_>>;

    /// Append a user message.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the message.
    fn send_message(
        &self,
        message: UserMessage,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Run until the agent finishes, pauses, or halts on a confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the cycle fails; the conversation stays usable.
    fn run_one_cycle(&self) -> Pin<Box<dyn Future<Output = Result<ExecutionStatus>> + Send + '_>>;

    /// Ask a running cycle to stop at the next safe point.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached.
    fn pause(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Install a confirmation policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the policy.
    fn set_confirmation_policy(
        &self,
        policy: ConfirmationPolicy,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Record rejection observations for every pending action.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be reached.
    fn reject_pending(&self, reason: String)
        -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// The ordered, append-only event log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn events(&self) -> Pin<Box<dyn Future<Output = Result<Vec<AgentEvent>>> + Send + '_>>;

    /// Whether the backing execution environment is still attached.
    fn is_alive(&self) -> bool;

    /// Release the conversation and its resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if shutdown could not be confirmed.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Constructs conversation handles.
pub trait ConversationFactory: Send + Sync {
    /// Start a new conversation or load a persisted one.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotConfigured`](crate::AppError::NotConfigured) if the
    ///   agent has not been set up.
    /// - [`AppError::InvalidInput`](crate::AppError::InvalidInput) for a bad
    ///   working directory.
    /// - [`AppError::Engine`](crate::AppError::Engine) if the engine fails to
    ///   start.
    fn start_or_load(
        &self,
        spec: ConversationSpec,
        sink: Arc<dyn EventSink>,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn Conversation>>> + Send + '_>>;

    /// Whether a credential for the execution environment is available.
    fn is_authenticated(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}
