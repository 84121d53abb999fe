//! Parsing of caller-supplied hardware commands.
//!
//! Applications name a hardware command either as a dotted string,
//! `"wiseXboard.digitalRead"`, or as a structured value such as
//! `{"hwCmd": "firmata.setPinMode", "args": [5, "PWM"]}`.  Both forms resolve
//! to a [`ParsedCommand`] (target hardware id, command name, arguments) before
//! any packet is built, so an invalid command never reaches the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised when a command cannot be resolved.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// A dotted command lacks its target or command segment.
    #[error("invalid command {0:?}: expected \"<target>.<command>\"")]
    MissingSegment(String),

    /// A structured command has no command name.
    #[error("invalid command: structured form has no command")]
    MissingCommand,

    /// A meta command name is empty.
    #[error("invalid command: meta command name is empty")]
    EmptyMetaCommand,
}

/// Structured form of a hardware command.
///
/// JSON input may use the wire names `hwId`, `hwCmd` or `cmd` instead of
/// `target` and `command`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredCommand {
    /// Hardware id.  When absent, `command` must be dotted.
    #[serde(default, alias = "hwId", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Command name, or `"<target>.<command>"` when `target` is absent.
    #[serde(default, alias = "hwCmd", alias = "cmd", skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments.  These replace any arguments passed alongside the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
}

/// A hardware command as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum HwCommand {
    /// `"<target>.<command>"`.
    Dotted(String),
    /// `{target?, command?, args?}`.
    Structured(StructuredCommand),
}

/// A fully resolved hardware command.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// Hardware id, sent as `hwId`.
    pub target: String,
    /// Command name, sent as `cmd`.
    pub command: String,
    /// Positional arguments, sent as `args`.
    pub args: Vec<Value>,
}

impl HwCommand {
    /// Resolves the command.
    ///
    /// `call_args` are used for the dotted form; the structured form carries
    /// its own arguments (absent means none).
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] if the target or the command is missing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hcp_core::HwCommand;
    /// use serde_json::json;
    ///
    /// let parsed = HwCommand::from("wiseXboard.digitalRead").parse(vec![json!(1)]).unwrap();
    /// assert_eq!(parsed.target, "wiseXboard");
    /// assert_eq!(parsed.command, "digitalRead");
    ///
    /// assert!(HwCommand::from("digitalRead").parse(vec![]).is_err());
    /// ```
    pub fn parse(self, call_args: Vec<Value>) -> Result<ParsedCommand, CommandError> {
        match self {
            HwCommand::Dotted(text) => {
                let (target, command) = split_dotted(&text)?;
                Ok(ParsedCommand {
                    target,
                    command,
                    args: call_args,
                })
            }
            HwCommand::Structured(structured) => {
                let command = structured
                    .command
                    .filter(|c| !c.is_empty())
                    .ok_or(CommandError::MissingCommand)?;
                let args = structured.args.unwrap_or_default();
                match structured.target.filter(|t| !t.is_empty()) {
                    Some(target) => Ok(ParsedCommand {
                        target,
                        command,
                        args,
                    }),
                    None => {
                        let (target, command) = split_dotted(&command)?;
                        Ok(ParsedCommand {
                            target,
                            command,
                            args,
                        })
                    }
                }
            }
        }
    }
}

impl From<&str> for HwCommand {
    fn from(text: &str) -> Self {
        HwCommand::Dotted(text.to_string())
    }
}

impl From<String> for HwCommand {
    fn from(text: String) -> Self {
        HwCommand::Dotted(text)
    }
}

impl From<StructuredCommand> for HwCommand {
    fn from(structured: StructuredCommand) -> Self {
        HwCommand::Structured(structured)
    }
}

/// Validates a meta command name.
///
/// # Errors
///
/// Returns [`CommandError::EmptyMetaCommand`] for an empty name.
pub fn parse_meta_command(command: &str) -> Result<&str, CommandError> {
    if command.is_empty() {
        return Err(CommandError::EmptyMetaCommand);
    }
    Ok(command)
}

/// Splits `"<target>.<command>"` at the first `.`; both sides must be non-empty.
fn split_dotted(text: &str) -> Result<(String, String), CommandError> {
    match text.split_once('.') {
        Some((target, command)) if !target.is_empty() && !command.is_empty() => {
            Ok((target.to_string(), command.to_string()))
        }
        _ => Err(CommandError::MissingSegment(text.to_string())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dotted_command_uses_call_args() {
        // Arrange
        let cmd = HwCommand::from("wiseXboard.digitalWrite");

        // Act
        let parsed = cmd.parse(vec![json!(1), json!(1)]).unwrap();

        // Assert
        assert_eq!(parsed.target, "wiseXboard");
        assert_eq!(parsed.command, "digitalWrite");
        assert_eq!(parsed.args, vec![json!(1), json!(1)]);
    }

    #[test]
    fn test_dotted_command_splits_at_first_dot() {
        let parsed = HwCommand::from("firmata.pin.read").parse(vec![]).unwrap();
        assert_eq!(parsed.target, "firmata");
        assert_eq!(parsed.command, "pin.read");
    }

    #[test]
    fn test_single_segment_dotted_command_is_invalid() {
        assert_eq!(
            HwCommand::from("digitalRead").parse(vec![]),
            Err(CommandError::MissingSegment("digitalRead".to_string()))
        );
    }

    #[test]
    fn test_dotted_command_with_empty_segment_is_invalid() {
        assert!(HwCommand::from(".digitalRead").parse(vec![]).is_err());
        assert!(HwCommand::from("wiseXboard.").parse(vec![]).is_err());
        assert!(HwCommand::from("").parse(vec![]).is_err());
    }

    #[test]
    fn test_structured_command_with_target() {
        let cmd = HwCommand::from(StructuredCommand {
            target: Some("firmata".into()),
            command: Some("setPinMode".into()),
            args: Some(vec![json!(5), json!("PWM")]),
        });

        let parsed = cmd.parse(vec![json!("ignored")]).unwrap();

        assert_eq!(parsed.target, "firmata");
        assert_eq!(parsed.command, "setPinMode");
        assert_eq!(parsed.args, vec![json!(5), json!("PWM")]);
    }

    #[test]
    fn test_structured_command_without_target_parses_dotted_command() {
        let cmd = HwCommand::from(StructuredCommand {
            target: None,
            command: Some("firmata.analogRead".into()),
            args: None,
        });

        let parsed = cmd.parse(vec![json!("ignored")]).unwrap();

        assert_eq!(parsed.target, "firmata");
        assert_eq!(parsed.command, "analogRead");
        assert!(parsed.args.is_empty(), "absent structured args mean no args");
    }

    #[test]
    fn test_structured_command_missing_command_is_invalid() {
        let cmd = HwCommand::from(StructuredCommand {
            target: Some("firmata".into()),
            command: None,
            args: Some(vec![]),
        });
        assert_eq!(cmd.parse(vec![]), Err(CommandError::MissingCommand));
    }

    #[test]
    fn test_structured_command_deserializes_wire_aliases() {
        let structured: StructuredCommand =
            serde_json::from_value(json!({"hwCmd": "firmata.setPinMode", "args": [5, "PWM"]}))
                .unwrap();

        let parsed = HwCommand::from(structured).parse(vec![]).unwrap();

        assert_eq!(parsed.target, "firmata");
        assert_eq!(parsed.command, "setPinMode");
        assert_eq!(parsed.args.len(), 2);
    }

    #[test]
    fn test_meta_command_must_not_be_empty() {
        assert_eq!(parse_meta_command("version"), Ok("version"));
        assert_eq!(parse_meta_command(""), Err(CommandError::EmptyMetaCommand));
    }
}
