//! Session registry: session id to conversation handle.
//!
//! The session map is only ever locked for plain lookups and inserts,
//! never across conversation I/O. Creation, resume, mode changes and close
//! for one id are serialized through that id's gate, so two requests for
//! the same id can never start two conversations while other sessions stay
//! reachable. The map itself is never exposed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::sink::NotificationSink;
use crate::acp::connection::Connection;
use crate::conversation::{Conversation, ConversationFactory, ConversationSpec, EventSink};
use crate::models::mode::ConfirmationMode;
use crate::models::session::{Session, SessionInfo};
use crate::{AppError, Result};

/// Defaults applied to newly created sessions.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Working directory when the client sends none.
    pub default_working_dir: PathBuf,
    /// MCP servers configured for every session, keyed by name.
    pub base_mcp_servers: Map<String, Value>,
    /// Initial confirmation mode.
    pub default_mode: ConfirmationMode,
    /// Token-by-token notifications.
    pub streaming: bool,
}

struct SessionEntry {
    session: Session,
    handle: Arc<dyn Conversation>,
    sink: Arc<NotificationSink>,
}

/// Owns every live session.
pub struct SessionRegistry {
    config: RegistryConfig,
    factory: Arc<dyn ConversationFactory>,
    connection: Connection,
    sessions: Mutex<HashMap<Uuid, SessionEntry>>,
    gates: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Create a registry; notifications go to `connection`.
    #[must_use]
    pub fn new(
        config: RegistryConfig,
        factory: Arc<dyn ConversationFactory>,
        connection: Connection,
    ) -> Self {
        Self {
            config,
            factory,
            connection,
            sessions: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the streaming path is enabled for new sessions.
    #[must_use]
    pub fn streaming(&self) -> bool {
        self.config.streaming
    }

    /// Return the cached handle, or start a fresh conversation.
    ///
    /// `working_dir` and `mcp_servers` only apply at creation; a cached
    /// handle is returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidInput`] if the working directory is unusable.
    /// - [`AppError::NotConfigured`] if the agent is not set up.
    /// - Any factory error. Nothing is cached on failure.
    pub async fn get_or_create(
        &self,
        session_id: Uuid,
        working_dir: Option<&Path>,
        mcp_servers: Option<Map<String, Value>>,
    ) -> Result<Arc<dyn Conversation>> {
        self.get_or_start(session_id, working_dir, mcp_servers, false)
            .instrument(info_span!("session_create", %session_id))
            .await
    }

    /// Return the cached handle, or load the session from persistence.
    ///
    /// Used when a request names a session this process has not seen yet,
    /// e.g. after a restart; an id with nothing persisted starts empty.
    ///
    /// # Errors
    ///
    /// Same as [`get_or_create`](Self::get_or_create).
    pub async fn get_or_load(&self, session_id: Uuid) -> Result<Arc<dyn Conversation>> {
        self.get_or_start(session_id, None, None, true)
            .instrument(info_span!("session_load", %session_id))
            .await
    }

    /// Reconstruct the session's handle from its persisted conversation,
    /// closing any cached handle first.
    ///
    /// A previously cached session keeps its working directory and mode
    /// unless `working_dir` overrides the directory.
    ///
    /// # Errors
    ///
    /// Same as [`get_or_create`](Self::get_or_create).
    pub async fn resume(
        &self,
        session_id: Uuid,
        working_dir: Option<&Path>,
        mcp_servers: Option<Map<String, Value>>,
    ) -> Result<Arc<dyn Conversation>> {
        let _gate = self.gate(session_id).await;

        let mut mode = self.config.default_mode;
        let mut previous_dir = None;
        let old = self.sessions.lock().await.remove(&session_id);
        if let Some(old) = old {
            info!(%session_id, "closing cached handle before resume");
            mode = old.session.mode;
            previous_dir = Some(old.session.working_dir.clone());
            if let Err(err) = old.handle.close().await {
                warn!(%session_id, error = %err, "closing stale handle failed");
            }
        }

        let dir = working_dir.or(previous_dir.as_deref());
        let entry = self
            .create(session_id, dir, mcp_servers, true, mode)
            .instrument(info_span!("session_resume", %session_id))
            .await?;
        Ok(self.insert(session_id, entry).await)
    }

    /// Cached handle, if any.
    pub async fn get(&self, session_id: Uuid) -> Option<Arc<dyn Conversation>> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .map(|entry| Arc::clone(&entry.handle))
    }

    /// Session record, if cached.
    pub async fn session(&self, session_id: Uuid) -> Option<Session> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .map(|entry| entry.session.clone())
    }

    /// Notification sink of a cached session.
    pub async fn sink(&self, session_id: Uuid) -> Option<Arc<NotificationSink>> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .map(|entry| Arc::clone(&entry.sink))
    }

    /// Replay the session's stored event log as notifications, in order.
    /// Returns the number of notifications sent.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if the session is not cached.
    /// - Errors reading the event log.
    pub async fn replay_history(&self, session_id: Uuid) -> Result<usize> {
        let (handle, sink) = {
            let sessions = self.sessions.lock().await;
            let entry = sessions
                .get(&session_id)
                .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
            (Arc::clone(&entry.handle), Arc::clone(&entry.sink))
        };
        let events = handle.events().await?;
        let sent = sink.replay(&events);
        debug!(%session_id, events = events.len(), sent, "history replayed");
        Ok(sent)
    }

    /// Release the session. Closing an unknown session succeeds.
    ///
    /// # Errors
    ///
    /// Returns the handle's close error; the session is evicted regardless.
    pub async fn close(&self, session_id: Uuid) -> Result<()> {
        let gate = self.gate(session_id).await;
        let removed = self.sessions.lock().await.remove(&session_id);
        drop(gate);
        self.prune_gate(session_id).await;

        let Some(entry) = removed else {
            debug!(%session_id, "close of unknown session ignored");
            return Ok(());
        };
        info!(%session_id, "session closed");
        entry.handle.close().await
    }

    /// Close every session, e.g. at shutdown.
    pub async fn close_all(&self) {
        let entries: Vec<_> = self.sessions.lock().await.drain().collect();
        for (session_id, entry) in entries {
            if let Err(err) = entry.handle.close().await {
                warn!(%session_id, error = %err, "close during shutdown failed");
            }
        }
    }

    /// Cached sessions, oldest first.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.lock().await;
        let mut entries: Vec<_> = sessions.values().map(|entry| &entry.session).collect();
        entries.sort_by_key(|session| session.created_at);
        entries.into_iter().map(Session::info).collect()
    }

    /// Confirmation mode of a cached session.
    pub async fn mode(&self, session_id: Uuid) -> Option<ConfirmationMode> {
        self.sessions
            .lock()
            .await
            .get(&session_id)
            .map(|entry| entry.session.mode)
    }

    /// Apply a confirmation mode to a cached session.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if the session is not cached.
    /// - The handle's policy error; the recorded mode is left unchanged.
    pub async fn set_mode(&self, session_id: Uuid, mode: ConfirmationMode) -> Result<()> {
        let _gate = self.gate(session_id).await;
        let handle = self
            .get(session_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
        handle.set_confirmation_policy(mode.policy()).await?;
        if let Some(entry) = self.sessions.lock().await.get_mut(&session_id) {
            entry.session.mode = mode;
        }
        info!(%session_id, mode = mode.id(), "confirmation mode set");
        Ok(())
    }

    async fn get_or_start(
        &self,
        session_id: Uuid,
        working_dir: Option<&Path>,
        mcp_servers: Option<Map<String, Value>>,
        resume: bool,
    ) -> Result<Arc<dyn Conversation>> {
        if let Some(handle) = self.get(session_id).await {
            return Ok(handle);
        }
        let gate = self.gate(session_id).await;
        // Another request may have finished creating it while we waited.
        if let Some(handle) = self.get(session_id).await {
            return Ok(handle);
        }

        let created = self
            .create(session_id, working_dir, mcp_servers, resume, self.config.default_mode)
            .await;
        match created {
            Ok(entry) => Ok(self.insert(session_id, entry).await),
            Err(err) => {
                drop(gate);
                self.prune_gate(session_id).await;
                Err(err)
            }
        }
    }

    /// Lock the per-id gate serializing lifecycle changes of one session.
    async fn gate(&self, session_id: Uuid) -> OwnedMutexGuard<()> {
        let gate = {
            let mut gates = self.gates.lock().await;
            Arc::clone(gates.entry(session_id).or_default())
        };
        gate.lock_owned().await
    }

    /// Drop the gate of `session_id` unless someone is holding or waiting on it.
    async fn prune_gate(&self, session_id: Uuid) {
        let mut gates = self.gates.lock().await;
        if gates
            .get(&session_id)
            .is_some_and(|gate| Arc::strong_count(gate) == 1)
        {
            gates.remove(&session_id);
        }
    }

    async fn insert(&self, session_id: Uuid, entry: SessionEntry) -> Arc<dyn Conversation> {
        let handle = Arc::clone(&entry.handle);
        self.sessions.lock().await.insert(session_id, entry);
        handle
    }

    async fn create(
        &self,
        session_id: Uuid,
        working_dir: Option<&Path>,
        mcp_servers: Option<Map<String, Value>>,
        resume: bool,
        mode: ConfirmationMode,
    ) -> Result<SessionEntry> {
        let working_dir = prepare_working_dir(working_dir.unwrap_or(&self.config.default_working_dir))?;

        let mut merged = self.config.base_mcp_servers.clone();
        if let Some(extra) = mcp_servers {
            merged.extend(extra);
        }

        let sink = Arc::new(NotificationSink::new(
            session_id.to_string(),
            self.connection.clone(),
            self.config.streaming,
        ));
        let spec = ConversationSpec {
            conversation_id: session_id,
            working_dir: working_dir.clone(),
            mcp_servers: merged,
            resume,
            streaming: self.config.streaming,
        };
        let handle = self
            .factory
            .start_or_load(spec, Arc::clone(&sink) as Arc<dyn EventSink>)
            .await?;

        if let Err(err) = handle.set_confirmation_policy(mode.policy()).await {
            warn!(%session_id, error = %err, "applying confirmation policy failed, closing handle");
            if let Err(close_err) = handle.close().await {
                debug!(%session_id, error = %close_err, "close after failed setup");
            }
            return Err(err);
        }

        info!(
            %session_id,
            working_dir = %working_dir.display(),
            mode = mode.id(),
            resume,
            "session ready"
        );
        Ok(SessionEntry {
            session: Session::new(session_id, working_dir, mode),
            handle,
            sink,
        })
    }
}

/// Create the directory if missing; reject paths that exist as non-directories.
fn prepare_working_dir(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(AppError::InvalidInput(format!(
            "working directory must be absolute: {}",
            path.display()
        )));
    }
    if path.exists() && !path.is_dir() {
        return Err(AppError::InvalidInput(format!(
            "working directory is not a directory: {}",
            path.display()
        )));
    }
    std::fs::create_dir_all(path).map_err(|err| {
        AppError::InvalidInput(format!(
            "cannot create working directory {}: {err}",
            path.display()
        ))
    })?;
    Ok(path.to_path_buf())
}
