//! JSON-RPC writer task.
//!
//! Drains outbound JSON values from an unbounded channel and writes each as
//! one NDJSON line. A single writer per peer gives every message on that
//! peer a total order: whatever was enqueued first is written first.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Writer task: serialize and write every queued message.
///
/// Exits when `cancel` fires or every sender is dropped. Messages already
/// queued when the channel closes are still written.
///
/// # Errors
///
/// - [`AppError::Acp`]`("failed to serialise outbound message: …")`.
/// - [`AppError::Acp`]`("write failed: …")` if the peer went away.
pub async fn run_writer<W>(
    peer: String,
    sink: W,
    mut rx: mpsc::UnboundedReceiver<serde_json::Value>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut sink = sink;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(peer, "writer: cancellation received, stopping");
                break;
            }

            msg = rx.recv() => {
                let Some(value) = msg else {
                    debug!(peer, "writer: channel closed, stopping");
                    break;
                };

                let mut bytes = serde_json::to_vec(&value).map_err(|e| {
                    AppError::Acp(format!("failed to serialise outbound message: {e}"))
                })?;
                bytes.push(b'\n');

                sink.write_all(&bytes).await.map_err(|e| {
                    warn!(peer, error = %e, "writer: write failed");
                    AppError::Acp(format!("write failed: {e}"))
                })?;
                sink.flush().await.map_err(|e| AppError::Acp(format!("write failed: {e}")))?;
            }
        }
    }

    Ok(())
}
