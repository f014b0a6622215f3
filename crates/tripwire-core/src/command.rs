//! Control protocol parsing and dispatch.
//!
//! Inbound control payloads are colon-delimited text, `pi:<cmd>[:<int>]`:
//!
//! | cmd | arg | effect |
//! |-----|-----|--------|
//! | `d` | -   | stop sensing |
//! | `e` | -   | resume sensing |
//! | `s` | int | retune decay sensitivity, echo `pi:s:<float>` |
//! | `f` | int | step the trigger threshold, echo `pi:t:<int>` |
//! | `b` | int | step the bounce interval in 10 ms units, rebind, echo `pi:b:<int>` |
//!
//! Traffic that is not addressed to the node (wrong prefix, too few fields)
//! is someone else's and is dropped quietly. Malformed arguments and unknown
//! commands are logged and discarded; nothing a controller sends can crash
//! the dispatcher or half-apply a mutation.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::TripwireError;
use crate::hardware::TriggerSource;
use crate::lifecycle::InterruptLifecycle;
use crate::transport::{EventSink, Outbound, NODE_PREFIX};
use crate::tunables::SharedTunables;
use crate::validator::DebounceValidator;

/// A validated control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `pi:d`: stop sensing.
    Disable,
    /// `pi:e`: resume sensing.
    Enable,
    /// `pi:s:<n>`: retune decay sensitivity.
    Sensitivity(i32),
    /// `pi:f:<n>`: step the trigger threshold.
    Threshold(i32),
    /// `pi:b:<n>`: step the bounce interval in 10 ms units.
    BounceInterval(i32),
}

/// Reasons a control payload is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Fewer than two colon-delimited fields.
    #[error("message has too few fields")]
    TooShort,

    /// First field is not this node's prefix; someone else's traffic.
    #[error("message is not addressed to this node")]
    NotAddressed,

    /// The command requires an integer argument and got something else.
    #[error("expected integer argument for '{cmd}', got '{value}'")]
    InvalidArgument {
        /// The command field.
        cmd: String,
        /// The offending argument field, possibly empty.
        value: String,
    },

    /// Unrecognized command field.
    #[error("unknown command '{0}'")]
    Unknown(String),
}

impl Command {
    /// Parse a raw control payload against the wire grammar.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::TooShort`] / [`CommandError::NotAddressed`]
    /// for traffic that is not this node's, and
    /// [`CommandError::InvalidArgument`] / [`CommandError::Unknown`] for
    /// malformed commands that were.
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let fields: Vec<&str> = raw.split(':').collect();
        if fields.len() < 2 {
            return Err(CommandError::TooShort);
        }
        if fields[0] != NODE_PREFIX {
            return Err(CommandError::NotAddressed);
        }

        match fields[1] {
            "d" => Ok(Self::Disable),
            "e" => Ok(Self::Enable),
            cmd => {
                let value = fields.get(2).copied().unwrap_or("");
                let argument: i32 =
                    value
                        .trim()
                        .parse()
                        .map_err(|_| CommandError::InvalidArgument {
                            cmd: cmd.to_string(),
                            value: value.to_string(),
                        })?;
                match cmd {
                    "s" => Ok(Self::Sensitivity(argument)),
                    "f" => Ok(Self::Threshold(argument)),
                    "b" => Ok(Self::BounceInterval(argument)),
                    other => Err(CommandError::Unknown(other.to_string())),
                }
            }
        }
    }
}

/// Applies inbound control messages to the node, exactly once per valid
/// message.
///
/// The dispatcher is the single writer of the tunables and the single caller
/// of lifecycle operations; `handle` takes `&mut self`, so one dispatch loop
/// serializes every lifecycle transition by construction.
pub struct CommandDispatcher<S: TriggerSource> {
    tunables: SharedTunables,
    validator: Arc<DebounceValidator>,
    lifecycle: InterruptLifecycle<S>,
    sink: Arc<dyn EventSink>,
}

impl<S: TriggerSource> CommandDispatcher<S> {
    /// Wire the dispatcher to the shared node state.
    pub fn new(
        tunables: SharedTunables,
        validator: Arc<DebounceValidator>,
        lifecycle: InterruptLifecycle<S>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            tunables,
            validator,
            lifecycle,
            sink,
        }
    }

    /// Bind the trigger and start sensing; the bootstrap path.
    ///
    /// # Errors
    ///
    /// Propagates [`TripwireError::BindExhausted`]; the caller decides to
    /// terminate.
    pub async fn enable_sensing(&mut self) -> Result<(), TripwireError> {
        self.lifecycle.enable().await
    }

    /// Release the trigger and the driver; the shutdown path. Best-effort.
    pub async fn shutdown(&mut self) {
        self.lifecycle.teardown().await;
    }

    /// Handle one raw control payload.
    ///
    /// Malformed and foreign payloads are absorbed here; the dispatcher
    /// never fails on input alone.
    ///
    /// # Errors
    ///
    /// Propagates only a fatal rebind exhaustion from `e`/`b` commands.
    pub async fn handle(&mut self, raw: &str) -> Result<(), TripwireError> {
        let command = match Command::parse(raw) {
            Ok(command) => command,
            Err(CommandError::TooShort | CommandError::NotAddressed) => {
                debug!(payload = raw, "ignoring foreign payload");
                return Ok(());
            }
            Err(error) => {
                warn!(payload = raw, %error, "discarding control payload");
                return Ok(());
            }
        };
        self.apply(command).await
    }

    async fn apply(&mut self, command: Command) -> Result<(), TripwireError> {
        match command {
            Command::Disable => {
                if self.lifecycle.is_bound() {
                    self.lifecycle.disable().await;
                } else {
                    debug!("sensing already disabled");
                }
                Ok(())
            }

            Command::Enable => {
                if self.lifecycle.is_bound() {
                    debug!("sensing already enabled");
                    Ok(())
                } else {
                    self.lifecycle.enable().await
                }
            }

            Command::Sensitivity(direction) => {
                self.validator.change_sensitivity(direction);
                let sensitivity = self.validator.sensitivity();
                info!(direction, sensitivity, "sensitivity changed");
                self.echo(&Outbound::Sensitivity(sensitivity));
                Ok(())
            }

            Command::Threshold(direction) => {
                let threshold = self.tunables.lock().adjust_threshold(direction);
                info!(direction, threshold, "trigger threshold changed");
                self.echo(&Outbound::Threshold(threshold));
                Ok(())
            }

            Command::BounceInterval(steps) => {
                let adjusted = self.tunables.lock().adjust_bounce_interval(steps);
                match adjusted {
                    None => {
                        debug!("bounce interval already at the floor");
                        Ok(())
                    }
                    // reconfigure() publishes the echo once the rebind holds
                    Some(_) => self.lifecycle.reconfigure().await,
                }
            }
        }
    }

    fn echo(&self, message: &Outbound) {
        if let Err(error) = self.sink.publish(message) {
            warn!(%error, "failed to publish echo");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands_without_argument() {
        assert_eq!(Command::parse("pi:d"), Ok(Command::Disable));
        assert_eq!(Command::parse("pi:e"), Ok(Command::Enable));
    }

    #[test]
    fn test_parse_commands_with_argument() {
        assert_eq!(Command::parse("pi:s:1"), Ok(Command::Sensitivity(1)));
        assert_eq!(Command::parse("pi:s:-2"), Ok(Command::Sensitivity(-2)));
        assert_eq!(Command::parse("pi:f:1"), Ok(Command::Threshold(1)));
        assert_eq!(Command::parse("pi:b:0"), Ok(Command::BounceInterval(0)));
    }

    #[test]
    fn test_parse_ignores_extra_fields_on_bare_commands() {
        assert_eq!(Command::parse("pi:d:junk"), Ok(Command::Disable));
    }

    #[test]
    fn test_too_few_fields() {
        assert_eq!(Command::parse("pi"), Err(CommandError::TooShort));
        assert_eq!(Command::parse(""), Err(CommandError::TooShort));
    }

    #[test]
    fn test_foreign_prefix() {
        assert_eq!(Command::parse("node:d"), Err(CommandError::NotAddressed));
        assert_eq!(Command::parse(":d"), Err(CommandError::NotAddressed));
    }

    #[test]
    fn test_non_integer_argument() {
        assert!(matches!(
            Command::parse("pi:s:abc"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::parse("pi:f"),
            Err(CommandError::InvalidArgument { .. })
        ));
        assert!(matches!(
            Command::parse("pi:b:"),
            Err(CommandError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_unknown_command_with_integer_argument() {
        assert_eq!(
            Command::parse("pi:x:1"),
            Err(CommandError::Unknown("x".to_string()))
        );
    }

    #[test]
    fn test_unknown_command_without_argument_reads_as_bad_argument() {
        // Mirrors the deployed grammar: the argument is parsed before the
        // command is resolved, so `pi:z` fails on the missing argument.
        assert!(matches!(
            Command::parse("pi:z"),
            Err(CommandError::InvalidArgument { .. })
        ));
    }
}
