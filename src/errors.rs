//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// The upstream agent has not been set up yet (non-retryable).
    NotConfigured(String),
    /// Malformed session id, bad working directory, unknown mode, bad params.
    InvalidInput(String),
    /// No valid credential for the backing execution environment.
    AuthRequired(String),
    /// Network or engine hiccup; the session stays usable for a later resume.
    Transient(String),
    /// Anything unexpected.
    Internal(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// ACP framing or protocol failure on the client stream.
    Acp(String),
    /// Failure reported by or while talking to the agent engine process.
    Engine(String),
    /// File-system or I/O operation failure.
    Io(String),
}

/// Coarse categories surfaced to the protocol client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad session id, bad working directory, bad mode id.
    InvalidInput,
    /// The caller should trigger a login flow.
    AuthRequired,
    /// Everything else.
    Internal,
}

impl AppError {
    /// Category this error is reported under.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) | Self::NotFound(_) => ErrorCategory::InvalidInput,
            Self::AuthRequired(_) => ErrorCategory::AuthRequired,
            Self::NotConfigured(_)
            | Self::Transient(_)
            | Self::Internal(_)
            | Self::Config(_)
            | Self::Acp(_)
            | Self::Engine(_)
            | Self::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Human-readable reason without the variant prefix.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::NotConfigured(msg)
            | Self::InvalidInput(msg)
            | Self::AuthRequired(msg)
            | Self::Transient(msg)
            | Self::Internal(msg)
            | Self::NotFound(msg)
            | Self::Config(msg)
            | Self::Acp(msg)
            | Self::Engine(msg)
            | Self::Io(msg) => msg,
        }
    }

    /// Optional remediation hint shown next to the reason.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotConfigured(_) => {
                Some("Run the agent setup once to create the agent settings file.")
            }
            Self::AuthRequired(_) => Some("Authenticate with one of the advertised auth methods."),
            Self::Transient(_) => Some("Retry the request; the session will be re-attached."),
            Self::Config(msg) if msg.contains("mcp") => {
                Some("Check the MCP config file for syntax errors.")
            }
            _ => None,
        }
    }

    /// Whether retrying the same request later can succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Engine(_) | Self::Io(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured(msg) => write!(f, "not configured: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::AuthRequired(msg) => write!(f, "auth required: {msg}"),
            Self::Transient(msg) => write!(f, "transient: {msg}"),
            Self::Internal(msg) => write!(f, "internal: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Acp(msg) => write!(f, "acp: {msg}"),
            Self::Engine(msg) => write!(f, "engine: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("json: {err}"))
    }
}
