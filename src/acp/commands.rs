//! Slash commands answered by the bridge without involving the agent.
//!
//! A prompt consisting of a single text block that starts with `/` is a
//! slash command. Replies go back to the client as one message chunk.

use std::fmt::Write as _;

use crate::models::mode::ConfirmationMode;
use crate::models::notification::{AvailableCommand, AvailableCommandInput};

/// Commands understood by [`parse_slash_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashCommand {
    /// List the available commands.
    Help,
    /// Show or change the confirmation mode.
    Confirm,
}

impl SlashCommand {
    /// Every command, in advertised order.
    pub const ALL: [Self; 2] = [Self::Help, Self::Confirm];

    /// Command name without the slash.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Confirm => "confirm",
        }
    }

    /// One-line description shown in command pickers.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Help => "Show available slash commands",
            Self::Confirm => "Show or change the confirmation mode",
        }
    }

    /// Look up a command by lowercase name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }
}

/// Commands sent in `available_commands_update`.
#[must_use]
pub fn available_commands() -> Vec<AvailableCommand> {
    SlashCommand::ALL
        .into_iter()
        .map(|command| AvailableCommand {
            name: command.name().to_owned(),
            description: command.description().to_owned(),
            input: match command {
                SlashCommand::Help => None,
                SlashCommand::Confirm => Some(AvailableCommandInput {
                    hint: mode_ids().join("|"),
                }),
            },
        })
        .collect()
}

/// Split `/name rest` into a lowercase name and trimmed argument.
///
/// Returns `None` for text that is not a slash command, including a bare
/// `/`.
#[must_use]
pub fn parse_slash_command(text: &str) -> Option<(String, String)> {
    let body = text.trim().strip_prefix('/')?;
    let (name, argument) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };
    if name.is_empty() {
        return None;
    }
    Some((name.to_ascii_lowercase(), argument.to_owned()))
}

/// Reply to `/help`.
#[must_use]
pub fn help_text() -> String {
    let mut text = String::from("Available slash commands:\n");
    for command in SlashCommand::ALL {
        let _ = writeln!(text, "  /{} - {}", command.name(), command.description());
    }
    text
}

/// Reply to an unrecognized command.
#[must_use]
pub fn unknown_command_text(name: &str) -> String {
    format!("Unknown command: /{name}\n\n{}", help_text())
}

/// Handle the argument of `/confirm`.
///
/// Returns the reply text and the mode to switch to, if any. An empty
/// argument shows the current mode; an unknown one leaves it unchanged.
#[must_use]
pub fn handle_confirm_argument(
    current: ConfirmationMode,
    argument: &str,
) -> (String, Option<ConfirmationMode>) {
    let argument = argument.trim();
    if argument.is_empty() {
        return (confirm_help_text(current), None);
    }
    match ConfirmationMode::parse(argument) {
        Some(mode) => (
            format!(
                "Confirmation mode set to: {mode}\n\n{}",
                mode.long_description()
            ),
            Some(mode),
        ),
        None => (
            format!(
                "Unknown mode: {argument}\n\nCurrent mode: {current}\n\n{}",
                modes_listing()
            ),
            None,
        ),
    }
}

fn confirm_help_text(current: ConfirmationMode) -> String {
    format!(
        "Current confirmation mode: {current}\n\n{}\nUsage: /confirm <mode>\n",
        modes_listing()
    )
}

fn modes_listing() -> String {
    let mut text = String::from("Available modes:\n");
    for mode in ConfirmationMode::ALL {
        let _ = writeln!(text, "  {} - {}", mode.id(), mode.short_description());
    }
    text
}

fn mode_ids() -> Vec<&'static str> {
    ConfirmationMode::ALL.into_iter().map(ConfirmationMode::id).collect()
}
