//! Per-session run-cycle guard.
//!
//! At most one run cycle is active per session. A prompt that arrives while
//! a cycle is running waits behind it on the session's FIFO gate instead of
//! replacing the tracked task. Cycles run on their own tokio task so a
//! dropped request future never leaves a half-finished cycle untracked.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::Conversation;
use crate::{AppError, Result};

/// Result of a guarded run cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    /// The cycle ran to its end.
    Completed(T),
    /// The cycle was force-cancelled.
    Cancelled,
}

/// Handle to the in-flight run cycle of a session.
#[derive(Debug, Clone)]
pub struct RunningTask {
    session_id: Uuid,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

impl RunningTask {
    /// Session the cycle belongs to.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Whether the cycle has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.done.borrow()
    }

    async fn wait(mut self) {
        // A closed channel means the cleanup already ran.
        let _ = self.done.wait_for(|done| *done).await;
    }
}

#[derive(Debug, Default)]
struct Slot {
    gate: Arc<tokio::sync::Mutex<()>>,
    running: Option<RunningTask>,
}

/// Tracks one running task per session.
#[derive(Debug, Clone, Default)]
pub struct TaskGuard {
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
}

impl TaskGuard {
    /// Empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `cycle` as the session's only active run cycle.
    ///
    /// Waits for any earlier cycle of the same session to end first.
    /// Cleanup (untracking, completion signal, releasing the gate) runs on
    /// every exit path, panics and cancellation included.
    ///
    /// # Errors
    ///
    /// Returns the cycle's own error, or `AppError::Internal` if the cycle
    /// panicked.
    pub async fn run<F, T>(&self, session_id: Uuid, cycle: F) -> Result<TaskOutcome<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let gate = Arc::clone(&self.lock().entry(session_id).or_default().gate);
        if gate.try_lock().is_err() {
            debug!(%session_id, "run cycle active, queueing prompt");
        }
        let permit = gate.lock_owned().await;

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        {
            let mut slots = self.lock();
            let slot = slots.entry(session_id).or_default();
            if slot.running.as_ref().is_some_and(|task| !task.is_finished()) {
                return Err(AppError::Internal(format!(
                    "run cycle already active for session {session_id}"
                )));
            }
            slot.running = Some(RunningTask {
                session_id,
                cancel: cancel.clone(),
                done: done_rx,
            });
        }

        let cleanup = Cleanup {
            slots: Arc::clone(&self.slots),
            session_id,
            done: done_tx,
            _permit: permit,
        };
        let handle = tokio::spawn(async move {
            let _cleanup = cleanup;
            tokio::select! {
                biased;
                () = cancel.cancelled() => Ok(TaskOutcome::Cancelled),
                result = cycle => result.map(TaskOutcome::Completed),
            }
        });

        match handle.await {
            Ok(result) => result,
            Err(err) => Err(AppError::Internal(format!("run cycle panicked: {err}"))),
        }
    }

    /// Pause the conversation and wait for the running cycle to end.
    ///
    /// Waits up to `timeout`; after that the cycle's token fires and the
    /// cycle is awaited again. Returns whether a cycle was running.
    ///
    /// # Errors
    ///
    /// Currently infallible; a failed pause is logged and the bounded wait
    /// still applies.
    pub async fn cancel(
        &self,
        session_id: Uuid,
        conversation: &dyn Conversation,
        timeout: Duration,
    ) -> Result<bool> {
        if let Err(err) = conversation.pause().await {
            warn!(%session_id, error = %err, "pause failed during cancel");
        }

        let Some(task) = self.running(session_id) else {
            debug!(%session_id, "cancel with no running cycle");
            return Ok(false);
        };

        if tokio::time::timeout(timeout, task.clone().wait()).await.is_ok() {
            info!(%session_id, "run cycle stopped after pause");
            return Ok(true);
        }

        warn!(
            %session_id,
            ?timeout,
            "run cycle did not stop within grace period, forcing cancellation"
        );
        task.cancel.cancel();
        task.wait().await;
        Ok(true)
    }

    /// Whether a cycle is active for the session.
    #[must_use]
    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.running(session_id)
            .is_some_and(|task| !task.is_finished())
    }

    /// The session's running task, if any.
    #[must_use]
    pub fn running(&self, session_id: Uuid) -> Option<RunningTask> {
        self.lock()
            .get(&session_id)
            .and_then(|slot| slot.running.clone())
    }

    /// Number of sessions with an active cycle.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.running.is_some())
            .count()
    }

    /// Drop bookkeeping for a closed session.
    pub fn forget(&self, session_id: Uuid) {
        self.lock().remove(&session_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Untracks the cycle and signals completion before the gate is released.
struct Cleanup {
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
    session_id: Uuid,
    done: watch::Sender<bool>,
    _permit: OwnedMutexGuard<()>,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&self.session_id) {
            slot.running = None;
        }
        drop(slots);
        self.done.send_replace(true);
    }
}
