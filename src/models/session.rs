//! Session model.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mode::ConfirmationMode;

/// One client-visible conversation tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Immutable identifier.
    pub id: Uuid,
    /// Working directory the engine runs in.
    pub working_dir: PathBuf,
    /// Current confirmation mode.
    pub mode: ConfirmationMode,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Construct a session record stamped with the current time.
    #[must_use]
    pub fn new(id: Uuid, working_dir: PathBuf, mode: ConfirmationMode) -> Self {
        Self {
            id,
            working_dir,
            mode,
            created_at: Utc::now(),
        }
    }

    /// Summary row for `session/list`.
    #[must_use]
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.to_string(),
            cwd: self.working_dir.display().to_string(),
            updated_at: Some(self.created_at.to_rfc3339()),
        }
    }
}

/// Wire shape of a `session/list` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session id.
    pub session_id: String,
    /// Working directory.
    pub cwd: String,
    /// RFC 3339 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Parse a client-supplied session id.
///
/// # Errors
///
/// Returns `AppError::InvalidInput` if `raw` is not a UUID.
pub fn parse_session_id(raw: &str) -> crate::Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|err| crate::AppError::InvalidInput(format!("invalid session id '{raw}': {err}")))
}
