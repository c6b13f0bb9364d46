//! JSON-RPC reader task.
//!
//! Reads newline-delimited JSON-RPC 2.0 messages from a peer (the editor on
//! stdin, or an engine's stdout), classifies each line, and forwards it
//! through a tokio [`mpsc`] channel. Framing goes through [`AcpCodec`], so
//! the per-line limit applies before any JSON parsing.
//!
//! | Shape                          | Classified as                      |
//! |--------------------------------|------------------------------------|
//! | `method` + non-null `id`       | [`RpcMessage::Request`]            |
//! | `method`, no `id`              | [`RpcMessage::Notification`]       |
//! | `id` + `result` or `error`     | [`RpcMessage::Response`]           |
//! | anything else                  | parse error, line skipped          |

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::acp::codec::AcpCodec;
use crate::{AppError, Result};

/// One inbound JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    /// A call expecting a response.
    Request {
        /// Correlation id, echoed in the response.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters, `null` when absent.
        params: Value,
    },
    /// A one-way message.
    Notification {
        /// Method name.
        method: String,
        /// Parameters, `null` when absent.
        params: Value,
    },
    /// The answer to one of our requests.
    Response {
        /// Id of the request being answered.
        id: Value,
        /// Success payload.
        result: Option<Value>,
        /// Error object.
        error: Option<Value>,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parse and classify one NDJSON line.
///
/// Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// - [`AppError::Acp`]`("malformed json: …")` if the line is not a JSON object.
/// - [`AppError::Acp`]`("not a json-rpc message")` if it has neither a
///   method nor a response id.
pub fn parse_inbound_line(line: &str) -> Result<Option<RpcMessage>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let envelope: Envelope =
        serde_json::from_str(line).map_err(|e| AppError::Acp(format!("malformed json: {e}")))?;

    let message = match (envelope.method, envelope.id) {
        (Some(method), Some(id)) => RpcMessage::Request {
            id,
            method,
            params: envelope.params.unwrap_or(Value::Null),
        },
        (Some(method), None) => RpcMessage::Notification {
            method,
            params: envelope.params.unwrap_or(Value::Null),
        },
        (None, Some(id)) if envelope.result.is_some() || envelope.error.is_some() => {
            RpcMessage::Response {
                id,
                result: envelope.result,
                error: envelope.error,
            }
        }
        _ => return Err(AppError::Acp("not a json-rpc message".into())),
    };
    Ok(Some(message))
}

/// Reader task: decode lines from `stream` and forward classified messages.
///
/// Oversized or malformed lines are logged and skipped; they do not stop the
/// reader. The task returns on EOF, on an I/O error, when `tx` closes, or
/// when `cancel` fires. Dropping `tx` on return is the receiver's EOF signal.
///
/// # Errors
///
/// Always returns `Ok(())`; failures are logged.
pub async fn run_reader<R>(
    peer: String,
    stream: R,
    tx: mpsc::Sender<RpcMessage>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stream, AcpCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(peer, "reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(peer, "reader: EOF detected");
                        break;
                    }

                    Some(Err(AppError::Acp(ref msg))) => {
                        warn!(peer, error = msg.as_str(), "reader: framing error, skipping");
                    }

                    Some(Err(e)) => {
                        warn!(peer, error = %e, "reader: IO error, stopping");
                        break;
                    }

                    Some(Ok(line)) => match parse_inbound_line(&line) {
                        Ok(Some(message)) => {
                            if tx.send(message).await.is_err() {
                                debug!(peer, "reader: receiver closed, stopping");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(peer, error = %e, raw_line = %line, "reader: parse error, skipping line");
                        }
                    },
                }
            }
        }
    }

    Ok(())
}
