//! Conductor Messages
//!
//! Messages sent from the Conductor to a rendering surface. The surface (the
//! terminal chat, a web page, a test harness) only renders what it is told;
//! all sequencing lives in the conversation model and the conductor.
//!
//! A streamed assistant turn is announced with [`ConductorMessage::StreamStart`],
//! grows through [`ConductorMessage::Token`] and finishes with exactly one of
//! [`ConductorMessage::StreamEnd`] or [`ConductorMessage::StreamError`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Messages from Conductor to a surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConductorMessage {
    /// A complete message to display
    Message {
        /// Unique message ID for tracking
        id: MessageId,
        /// Who sent this message
        sender: Sender,
        /// The message content
        content: String,
    },

    /// An assistant turn opened and will receive tokens
    StreamStart {
        /// Message ID of the open assistant turn
        message_id: MessageId,
    },

    /// A streaming fragment (partial response)
    Token {
        /// Message ID this fragment belongs to
        message_id: MessageId,
        /// The fragment text
        text: String,
    },

    /// Stream has completed and the turn is sealed
    StreamEnd {
        /// Message ID that completed
        message_id: MessageId,
        /// Final sealed content
        final_content: String,
        /// Timing and token counts for the turn
        metadata: ResponseMetadata,
    },

    /// Stream failed and the turn was sealed with an error text
    StreamError {
        /// Message ID that errored
        message_id: MessageId,
        /// Error description
        error: String,
    },

    /// Conductor state changed
    State {
        /// The new state
        state: ConductorState,
    },

    /// Out-of-band notification (not part of the conversation)
    Notify {
        /// Severity
        level: NotifyLevel,
        /// Human readable text
        message: String,
    },
}

/// Unique message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("msg_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// User input
    User,
    /// Language model reply
    Assistant,
}

impl Sender {
    /// Label used when rendering transcripts
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "Assistant",
        }
    }
}

/// Operational state of the conductor as shown to a surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConductorState {
    /// Waiting for user input
    Ready,
    /// Request sent, no fragment received yet
    Thinking,
    /// Fragments are arriving
    Responding,
}

impl ConductorState {
    /// Short description for status lines
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Thinking => "Thinking...",
            Self::Responding => "Responding...",
        }
    }
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational
    Info,
    /// Something the user should look at
    Warning,
    /// An operation failed
    Error,
}

/// Metadata about a completed response
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Wall time from request to end of stream in milliseconds
    pub elapsed_ms: u64,
    /// Number of non-empty fragments applied to the turn
    pub fragment_count: u32,
    /// Prompt tokens evaluated, as reported by the backend's final frame
    pub prompt_eval_count: Option<u64>,
    /// Generated tokens, as reported by the backend's final frame
    pub eval_count: Option<u64>,
    /// Backend-side total duration in nanoseconds
    pub total_duration_ns: Option<u64>,
}

impl ResponseMetadata {
    /// Create metadata with timing information only
    #[must_use]
    pub fn with_timing(elapsed_ms: u64, fragment_count: u32) -> Self {
        Self {
            elapsed_ms,
            fragment_count,
            ..Default::default()
        }
    }

    /// Generated tokens per second, when the backend reported enough to compute it
    #[must_use]
    pub fn tokens_per_second(&self) -> Option<f64> {
        let eval = self.eval_count?;
        if self.elapsed_ms == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(eval as f64 / (self.elapsed_ms as f64 / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_unique() {
        let id1 = MessageId::new();
        let id2 = MessageId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("msg_"));
    }

    #[test]
    fn test_sender_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Sender::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Sender::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_sender_labels() {
        assert_eq!(Sender::User.label(), "You");
        assert_eq!(Sender::Assistant.label(), "Assistant");
    }

    #[test]
    fn test_conductor_state_description() {
        assert_eq!(ConductorState::Ready.description(), "Ready");
        assert_eq!(ConductorState::Thinking.description(), "Thinking...");
    }

    #[test]
    fn test_tokens_per_second() {
        let mut metadata = ResponseMetadata::with_timing(2000, 10);
        assert_eq!(metadata.tokens_per_second(), None);

        metadata.eval_count = Some(40);
        let tps = metadata.tokens_per_second().unwrap();
        assert!((tps - 20.0).abs() < f64::EPSILON);
    }
}
