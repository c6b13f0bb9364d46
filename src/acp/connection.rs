//! JSON-RPC peer connection: outbound sends and request/response matching.
//!
//! A [`Connection`] is a cheap clonable handle over the peer's writer
//! channel. Outbound requests park a [`oneshot`] sender in the pending map
//! keyed by request id; the dispatch loop hands responses back through
//! [`Connection::resolve_response`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::errors::ErrorCategory;
use crate::models::notification::Notification;
use crate::{AppError, Result};

/// Invalid method parameter(s).
pub const INVALID_PARAMS: i64 = -32602;
/// Method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;
/// Authentication required (ACP extension range).
pub const AUTH_REQUIRED: i64 = -32000;

/// Pending outbound requests keyed by request id.
pub type PendingResponses = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// Handle to one JSON-RPC peer.
#[derive(Debug, Clone)]
pub struct Connection {
    peer: Arc<str>,
    tx: mpsc::UnboundedSender<Value>,
    pending: PendingResponses,
    next_id: Arc<AtomicU64>,
}

impl Connection {
    /// Create a connection and the receiver its writer task drains.
    #[must_use]
    pub fn new(peer: &str) -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Self {
            peer: Arc::from(peer),
            tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (connection, rx)
    }

    /// Peer label used in logs.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Enqueue a raw message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if the writer has shut down.
    pub fn send(&self, message: Value) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| AppError::Acp(format!("{} connection closed", self.peer)))
    }

    /// Enqueue a notification.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if the writer has shut down.
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
    }

    /// Enqueue a `session/update` notification.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if the writer has shut down.
    pub fn send_update(&self, notification: &Notification) -> Result<()> {
        self.notify("session/update", serde_json::to_value(notification)?)
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`AppError::Acp`] if the writer has shut down or the connection
    ///   closed before a response arrived.
    /// - The error mapped from the peer's error object otherwise.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        let _slot = PendingSlot {
            pending: Arc::clone(&self.pending),
            id,
        };

        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.send(message)?;
        debug!(peer = %self.peer, id, method, "request sent");

        rx.await.map_err(|_| {
            AppError::Acp(format!(
                "{} connection closed before response to {method}",
                self.peer
            ))
        })?
    }

    /// Answer a request with a result.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if the writer has shut down.
    pub fn respond(&self, id: Value, result: Value) -> Result<()> {
        self.send(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }

    /// Answer a request with an error derived from `err`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if the writer has shut down.
    pub fn respond_error(&self, id: Value, err: &AppError) -> Result<()> {
        self.send(json!({"jsonrpc": "2.0", "id": id, "error": error_object(err)}))
    }

    /// Answer a request for an unknown method.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acp`] if the writer has shut down.
    pub fn respond_method_not_found(&self, id: Value, method: &str) -> Result<()> {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": METHOD_NOT_FOUND, "message": format!("Method not found: {method}")},
        }))
    }

    /// Deliver a response to the waiting request. Returns `false` when no
    /// request with that id is pending.
    pub async fn resolve_response(
        &self,
        id: &Value,
        result: Option<Value>,
        error: Option<Value>,
    ) -> bool {
        let Some(key) = id.as_u64() else {
            warn!(peer = %self.peer, %id, "response with non-numeric id ignored");
            return false;
        };
        let Some(sender) = self.pending.lock().await.remove(&key) else {
            warn!(peer = %self.peer, id = key, "response for unknown request ignored");
            return false;
        };

        let outcome = match error {
            Some(error) => Err(error_from_object(&error)),
            None => Ok(result.unwrap_or(Value::Null)),
        };
        if sender.send(outcome).is_err() {
            debug!(peer = %self.peer, id = key, "requester dropped before response");
        }
        true
    }

    /// Fail every pending request, e.g. after the peer exited.
    pub async fn fail_pending(&self, reason: &str) {
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        for (_, sender) in drained {
            let _ = sender.send(Err(AppError::Acp(format!("{}: {reason}", self.peer))));
        }
    }

    /// Number of requests awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Removes a request's pending entry when the requester goes away, whether
/// it got its answer, failed to send, or was dropped mid-wait.
struct PendingSlot {
    pending: PendingResponses,
    id: u64,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        let id = self.id;
        if let Ok(mut pending) = self.pending.try_lock() {
            pending.remove(&id);
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let pending = Arc::clone(&self.pending);
            runtime.spawn(async move {
                pending.lock().await.remove(&id);
            });
        }
    }
}

/// JSON-RPC error object for an application error.
///
/// `data` carries the reason and, when one exists, a remediation hint.
#[must_use]
pub fn error_object(err: &AppError) -> Value {
    let code = match err.category() {
        ErrorCategory::InvalidInput => INVALID_PARAMS,
        ErrorCategory::AuthRequired => AUTH_REQUIRED,
        ErrorCategory::Internal => INTERNAL_ERROR,
    };
    let message = match err.category() {
        ErrorCategory::InvalidInput => "Invalid params",
        ErrorCategory::AuthRequired => "Authentication required",
        ErrorCategory::Internal => "Internal error",
    };

    let mut data = serde_json::Map::new();
    data.insert("reason".into(), Value::String(err.reason().to_owned()));
    data.insert("details".into(), Value::String(err.to_string()));
    if let Some(hint) = err.hint() {
        data.insert("help".into(), Value::String(hint.to_owned()));
    }

    json!({"code": code, "message": message, "data": data})
}

/// Map a peer's error object back to an application error.
#[must_use]
pub fn error_from_object(error: &Value) -> AppError {
    let message = error
        .get("data")
        .and_then(|data| data.get("reason"))
        .and_then(Value::as_str)
        .or_else(|| error.get("message").and_then(Value::as_str))
        .unwrap_or("unknown error")
        .to_owned();

    match error.get("code").and_then(Value::as_i64) {
        Some(INVALID_PARAMS) => AppError::InvalidInput(message),
        Some(AUTH_REQUIRED) => AppError::AuthRequired(message),
        Some(METHOD_NOT_FOUND) => AppError::NotFound(message),
        _ => AppError::Engine(message),
    }
}
