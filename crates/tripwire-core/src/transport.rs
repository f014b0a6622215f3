//! Outbound message seam.
//!
//! The node publishes short colon-delimited text bodies on a single message
//! topic; the controller on the other end has no separate acknowledgement
//! channel, so every state mutation is confirmed by echoing the new effective
//! value. [`Outbound`] enumerates everything the node ever says and renders
//! the exact wire body via `Display`.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

/// Field prefix identifying this node's traffic on both topics.
pub const NODE_PREFIX: &str = "pi";

/// Everything the node publishes on the message topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// `pi:u:s`: node online, sent on every (re)connect.
    Online,
    /// `pi:u:e`: node shutting down.
    Shutdown,
    /// `pi:u:a`: accumulated triggers crossed the alarm threshold.
    Alarm,
    /// `pi:s:<float>`: effective tick period in seconds, echoed after an
    /// `s` command.
    Sensitivity(f64),
    /// `pi:t:<int>`: trigger threshold, echoed after an `f` command.
    Threshold(u8),
    /// `pi:b:<int>`: bounce interval in milliseconds, echoed after a
    /// reconfigure.
    BounceInterval(u64),
    /// `pi:*`: periodic liveness signal.
    Heartbeat,
}

impl fmt::Display for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => write!(f, "{NODE_PREFIX}:u:s"),
            Self::Shutdown => write!(f, "{NODE_PREFIX}:u:e"),
            Self::Alarm => write!(f, "{NODE_PREFIX}:u:a"),
            Self::Sensitivity(secs) => write!(f, "{NODE_PREFIX}:s:{secs}"),
            Self::Threshold(threshold) => write!(f, "{NODE_PREFIX}:t:{threshold}"),
            Self::BounceInterval(ms) => write!(f, "{NODE_PREFIX}:b:{ms}"),
            Self::Heartbeat => write!(f, "{NODE_PREFIX}:*"),
        }
    }
}

/// Errors from the outbound channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport rejected or dropped the message.
    #[error("publish failed: {0}")]
    Publish(String),
}

/// Where outbound messages go.
///
/// `publish` is called from the interrupt callback path, so implementations
/// must not block; queue-and-return is the expected shape. A failed publish
/// is the caller's to log; it is never fatal to sensing.
pub trait EventSink: Send + Sync {
    /// Publish one message body.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport cannot accept the message.
    fn publish(&self, message: &Outbound) -> Result<(), TransportError>;
}

/// In-memory sink that records every published body, in order.
///
/// Test double for the real transport adapter.
#[derive(Debug, Default)]
pub struct RecordingSink {
    published: Mutex<Vec<String>>,
    failures_remaining: Mutex<u32>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` publishes fail.
    pub fn fail_next_publishes(&self, n: u32) {
        *lock(&self.failures_remaining) = n;
    }

    /// Every body published so far, oldest first.
    #[must_use]
    pub fn bodies(&self) -> Vec<String> {
        lock(&self.published).clone()
    }

    /// How many times `body` was published.
    #[must_use]
    pub fn count_of(&self, body: &str) -> usize {
        lock(&self.published).iter().filter(|b| b == &body).count()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, message: &Outbound) -> Result<(), TransportError> {
        let mut failures = lock(&self.failures_remaining);
        if *failures > 0 {
            *failures -= 1;
            return Err(TransportError::Publish("simulated publish failure".into()));
        }
        drop(failures);
        lock(&self.published).push(message.to_string());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bodies_are_exact() {
        assert_eq!(Outbound::Online.to_string(), "pi:u:s");
        assert_eq!(Outbound::Shutdown.to_string(), "pi:u:e");
        assert_eq!(Outbound::Alarm.to_string(), "pi:u:a");
        assert_eq!(Outbound::Sensitivity(0.8).to_string(), "pi:s:0.8");
        assert_eq!(Outbound::Threshold(4).to_string(), "pi:t:4");
        assert_eq!(Outbound::BounceInterval(150).to_string(), "pi:b:150");
        assert_eq!(Outbound::Heartbeat.to_string(), "pi:*");
    }

    #[test]
    fn test_recording_sink_preserves_order() {
        let sink = RecordingSink::new();
        sink.publish(&Outbound::Online).unwrap();
        sink.publish(&Outbound::Alarm).unwrap();
        assert_eq!(sink.bodies(), vec!["pi:u:s", "pi:u:a"]);
        assert_eq!(sink.count_of("pi:u:a"), 1);
    }

    #[test]
    fn test_injected_publish_failures() {
        let sink = RecordingSink::new();
        sink.fail_next_publishes(1);
        assert!(sink.publish(&Outbound::Heartbeat).is_err());
        assert!(sink.publish(&Outbound::Heartbeat).is_ok());
        assert_eq!(sink.count_of("pi:*"), 1);
    }
}
