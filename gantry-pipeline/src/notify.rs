//! Notification boundary.
//!
//! Pipeline outcomes are reported through an external utility invoked as
//! `<command> <channel> <message>`. Notification is strictly best-effort:
//! a failure to notify is logged and never masks or overrides the
//! pipeline's own result.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use gantry_core::exec::{self, CommandSpec, ExecError};

/// The small closed set of notification channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Chat,
    Mail,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Chat => write!(f, "chat"),
            Channel::Mail => write!(f, "mail"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Ok(Channel::Chat),
            "mail" => Ok(Channel::Mail),
            other => Err(format!("unknown channel '{other}'; expected: chat, mail")),
        }
    }
}

/// Something that can deliver a notification.
pub trait Notifier {
    fn notify(&self, channel: Channel, message: &str) -> Result<(), ExecError>;
}

/// Invokes the configured external notification command.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, channel: Channel, message: &str) -> Result<(), ExecError> {
        let spec = CommandSpec::new(&self.program)
            .arg(channel.to_string())
            .arg(message)
            .timeout(self.timeout);
        exec::run(&spec).map(|_| ())
    }
}

/// Deliver if a notifier is configured; swallow and log any failure.
pub fn notify_best_effort(notifier: Option<&CommandNotifier>, channel: Channel, message: &str) {
    let Some(notifier) = notifier else { return };
    if let Err(err) = notifier.notify(channel, message) {
        tracing::warn!("notification on '{channel}' failed: {err}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_round_trips_through_strings() {
        assert_eq!("chat".parse::<Channel>().unwrap(), Channel::Chat);
        assert_eq!("Mail".parse::<Channel>().unwrap(), Channel::Mail);
        assert_eq!(Channel::Chat.to_string(), "chat");
        assert!("pager".parse::<Channel>().is_err());
    }

    #[test]
    fn command_notifier_invokes_the_utility() {
        // `true` accepts any arguments and exits 0.
        let notifier = CommandNotifier::new("true");
        notifier.notify(Channel::Chat, "deployed demo v1.0.0").unwrap();
    }

    #[test]
    fn failing_notifier_surfaces_the_error() {
        let notifier = CommandNotifier::new("false");
        assert!(notifier.notify(Channel::Mail, "x").is_err());
    }

    #[test]
    fn best_effort_swallows_failures() {
        let notifier = CommandNotifier::new("gantry-no-such-notifier");
        // Must not panic or propagate.
        notify_best_effort(Some(&notifier), Channel::Chat, "x");
        notify_best_effort(None, Channel::Chat, "x");
    }
}
