//! Confirmation modes exposed to the client and the policies they map to.

use serde::{Deserialize, Serialize};

/// Risk label an engine attaches to a proposed action.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SecurityRisk {
    /// No analyzer verdict.
    #[default]
    Unknown,
    /// Safe to run.
    Low,
    /// Worth a look.
    Medium,
    /// Needs a human.
    High,
}

/// Confirmation policy applied to a conversation handle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// Every action halts for confirmation.
    AlwaysConfirm,
    /// No action halts for confirmation.
    NeverConfirm,
    /// Only actions at or above `threshold` halt for confirmation.
    ConfirmRisky {
        /// Lowest risk that still requires confirmation.
        threshold: SecurityRisk,
    },
}

impl ConfirmationPolicy {
    /// Risk-based policy with the default `high` threshold.
    #[must_use]
    pub fn confirm_risky() -> Self {
        Self::ConfirmRisky {
            threshold: SecurityRisk::High,
        }
    }
}

/// Client-visible confirmation mode (the ACP session mode).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationMode {
    /// Ask before every action.
    #[default]
    AlwaysAsk,
    /// Never ask.
    AlwaysApprove,
    /// Let the security analyzer approve low and medium risk actions.
    LlmApprove,
}

impl ConfirmationMode {
    /// Every mode, in the order advertised to clients.
    pub const ALL: [Self; 3] = [Self::AlwaysAsk, Self::AlwaysApprove, Self::LlmApprove];

    /// Wire identifier, e.g. `always-ask`.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::AlwaysAsk => "always-ask",
            Self::AlwaysApprove => "always-approve",
            Self::LlmApprove => "llm-approve",
        }
    }

    /// Parse a mode id, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|mode| mode.id() == wanted)
    }

    /// Display name for mode pickers.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::AlwaysAsk => "Always Ask",
            Self::AlwaysApprove => "Always Approve",
            Self::LlmApprove => "LLM Approve",
        }
    }

    /// One-line description.
    #[must_use]
    pub fn short_description(self) -> &'static str {
        match self {
            Self::AlwaysAsk => "Request permission before each action",
            Self::AlwaysApprove => "Automatically approve all actions",
            Self::LlmApprove => "Use LLM security analyzer to auto-approve safe actions",
        }
    }

    /// Longer description used in `/confirm` replies.
    #[must_use]
    pub fn long_description(self) -> &'static str {
        match self {
            Self::AlwaysAsk => {
                "The agent will ask for your permission before executing every action."
            }
            Self::AlwaysApprove => {
                "The agent will execute all actions without asking for permission."
            }
            Self::LlmApprove => {
                "The agent will only ask for permission on actions the security analyzer \
                 rates as high risk."
            }
        }
    }

    /// Policy applied to the conversation handle for this mode.
    #[must_use]
    pub fn policy(self) -> ConfirmationPolicy {
        match self {
            Self::AlwaysAsk => ConfirmationPolicy::AlwaysConfirm,
            Self::AlwaysApprove => ConfirmationPolicy::NeverConfirm,
            Self::LlmApprove => ConfirmationPolicy::confirm_risky(),
        }
    }

    /// Mode corresponding to a policy read back from a handle.
    #[must_use]
    pub fn from_policy(policy: ConfirmationPolicy) -> Self {
        match policy {
            ConfirmationPolicy::AlwaysConfirm => Self::AlwaysAsk,
            ConfirmationPolicy::NeverConfirm => Self::AlwaysApprove,
            ConfirmationPolicy::ConfirmRisky { .. } => Self::LlmApprove,
        }
    }
}

impl std::fmt::Display for ConfirmationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// One selectable mode in [`SessionModeState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionModeInfo {
    /// Mode id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Short description.
    pub description: String,
}

/// Mode block returned from `session/new` and `session/load`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionModeState {
    /// Active mode id.
    pub current_mode_id: String,
    /// All modes the client may switch to.
    pub available_modes: Vec<SessionModeInfo>,
}

impl SessionModeState {
    /// Build the mode block with `current` selected.
    #[must_use]
    pub fn new(current: ConfirmationMode) -> Self {
        Self {
            current_mode_id: current.id().to_owned(),
            available_modes: ConfirmationMode::ALL
                .into_iter()
                .map(|mode| SessionModeInfo {
                    id: mode.id().to_owned(),
                    name: mode.name().to_owned(),
                    description: mode.short_description().to_owned(),
                })
                .collect(),
        }
    }
}
