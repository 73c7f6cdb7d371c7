//! Conversation Model
//!
//! An ordered, append-only log of user and assistant turns. The only
//! in-place mutation is the text of the single *open* assistant message,
//! which grows as fragments arrive and is sealed when its stream ends.
//!
//! # State machine
//!
//! ```text
//!            submit_user_message
//!   Idle ───────────────────────────▶ AwaitingResponse
//!    ▲                                     │
//!    └──── seal_open_assistant ────────────┤
//!    └──── fail_open_assistant ────────────┘
//! ```
//!
//! The model is a plain data structure. Rendering layers observe it (or the
//! conductor's messages); they never mutate it directly.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::messages::{MessageId, Sender};

// ============================================================================
// Identifiers and errors
// ============================================================================

/// Unique identifier for a conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Create a new unique conversation ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Why a submission was rejected
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputRejection {
    /// Nothing left after trimming whitespace
    Empty,
    /// An assistant turn is still open
    TurnInProgress,
    /// Longer than the configured limit
    TooLong {
        /// Length of the submission in characters
        len: usize,
        /// Configured maximum
        max: usize,
    },
}

impl fmt::Display for InputRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "message is empty"),
            Self::TurnInProgress => write!(f, "still waiting for the previous response"),
            Self::TooLong { len, max } => {
                write!(f, "message is {len} characters, limit is {max}")
            }
        }
    }
}

/// Usage errors from the conversation state machine
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConversationError {
    /// The submission was rejected; nothing was appended
    #[error("invalid input: {0}")]
    InvalidInput(InputRejection),

    /// A mutation needed an open assistant turn and none exists
    #[error("no assistant turn is open")]
    NoOpenTurn,
}

// ============================================================================
// Messages
// ============================================================================

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub sender: Sender,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    text: String,
    open: bool,
}

impl ChatMessage {
    fn user(text: String, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::User,
            timestamp,
            text,
            open: false,
        }
    }

    fn open_assistant(timestamp: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::Assistant,
            timestamp,
            text: String::new(),
            open: true,
        }
    }

    /// Message text
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this is the open assistant turn
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }
}

/// Identifiers of the two messages appended by a successful submission
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedTurn {
    /// The user message
    pub user_id: MessageId,
    /// The open assistant message
    pub assistant_id: MessageId,
}

/// Conversation state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationState {
    /// Ready for a submission
    #[default]
    Idle,
    /// An assistant turn is open
    AwaitingResponse,
}

// ============================================================================
// Conversation
// ============================================================================

/// An in-memory conversation between the user and the assistant
#[derive(Clone, Debug)]
pub struct Conversation {
    id: ConversationId,
    messages: Vec<ChatMessage>,
    /// Index of the open assistant message (if any)
    open_index: Option<usize>,
    /// Maximum submission length in characters (0 = unlimited)
    max_input_length: usize,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            open_index: None,
            max_input_length: 0,
            last_timestamp: None,
        }
    }

    /// Create an empty conversation that rejects submissions over `max` characters
    #[must_use]
    pub fn with_max_input_length(max: usize) -> Self {
        Self {
            max_input_length: max,
            ..Self::new()
        }
    }

    /// Conversation identifier
    #[must_use]
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConversationState {
        if self.open_index.is_some() {
            ConversationState::AwaitingResponse
        } else {
            ConversationState::Idle
        }
    }

    /// Append a user turn followed by an empty open assistant turn
    ///
    /// # Errors
    ///
    /// [`ConversationError::InvalidInput`] when the trimmed text is empty,
    /// too long, or an assistant turn is still open. Nothing is appended.
    pub fn submit_user_message(&mut self, text: &str) -> Result<SubmittedTurn, ConversationError> {
        if self.open_index.is_some() {
            return Err(ConversationError::InvalidInput(InputRejection::TurnInProgress));
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(ConversationError::InvalidInput(InputRejection::Empty));
        }

        let len = text.chars().count();
        if self.max_input_length > 0 && len > self.max_input_length {
            return Err(ConversationError::InvalidInput(InputRejection::TooLong {
                len,
                max: self.max_input_length,
            }));
        }

        let user = ChatMessage::user(text.to_string(), self.next_timestamp());
        let assistant = ChatMessage::open_assistant(self.next_timestamp());
        let turn = SubmittedTurn {
            user_id: user.id.clone(),
            assistant_id: assistant.id.clone(),
        };

        self.messages.push(user);
        self.messages.push(assistant);
        self.open_index = Some(self.messages.len() - 1);

        tracing::debug!(
            conversation = %self.id,
            user_id = %turn.user_id,
            assistant_id = %turn.assistant_id,
            "Opened assistant turn"
        );
        Ok(turn)
    }

    /// Append a fragment to the open assistant message
    ///
    /// # Errors
    ///
    /// [`ConversationError::NoOpenTurn`] when no assistant turn is open.
    pub fn append_to_open_assistant(&mut self, fragment: &str) -> Result<(), ConversationError> {
        let idx = self.open_index.ok_or(ConversationError::NoOpenTurn)?;
        self.messages[idx].text.push_str(fragment);
        Ok(())
    }

    /// Seal the open assistant message
    ///
    /// Returns the sealed message, or `None` when nothing was open.
    pub fn seal_open_assistant(&mut self) -> Option<&ChatMessage> {
        let idx = self.open_index.take()?;
        let msg = &mut self.messages[idx];
        msg.open = false;

        tracing::debug!(
            conversation = %self.id,
            message_id = %msg.id,
            bytes = msg.text.len(),
            "Sealed assistant turn"
        );
        Some(&self.messages[idx])
    }

    /// Replace the open assistant message's text with `error_text` and seal it
    ///
    /// # Errors
    ///
    /// [`ConversationError::NoOpenTurn`] when no assistant turn is open.
    pub fn fail_open_assistant(
        &mut self,
        error_text: impl Into<String>,
    ) -> Result<&ChatMessage, ConversationError> {
        let idx = self.open_index.take().ok_or(ConversationError::NoOpenTurn)?;
        let msg = &mut self.messages[idx];
        msg.text = error_text.into();
        msg.open = false;

        tracing::debug!(
            conversation = %self.id,
            message_id = %msg.id,
            "Failed assistant turn"
        );
        Ok(&self.messages[idx])
    }

    /// The open assistant message, if any
    #[must_use]
    pub fn open_message(&self) -> Option<&ChatMessage> {
        self.open_index.map(|idx| &self.messages[idx])
    }

    /// The most recent assistant message, open or sealed
    #[must_use]
    pub fn last_assistant(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Assistant)
    }

    /// Get message by ID
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// All messages in display order
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Creation time for the next message, never earlier than the previous one
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_conversation_is_idle_and_empty() {
        let conversation = Conversation::new();
        assert_eq!(conversation.state(), ConversationState::Idle);
        assert!(conversation.is_empty());
        assert!(conversation.open_message().is_none());
    }

    #[test]
    fn test_submit_appends_user_and_open_assistant() {
        let mut conversation = Conversation::new();
        let turn = conversation.submit_user_message("  hi there \n").unwrap();

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.state(), ConversationState::AwaitingResponse);

        let user = conversation.get(&turn.user_id).unwrap();
        assert_eq!(user.sender, Sender::User);
        assert_eq!(user.text(), "hi there");
        assert!(!user.is_open());

        let assistant = conversation.open_message().unwrap();
        assert_eq!(assistant.id, turn.assistant_id);
        assert_eq!(assistant.sender, Sender::Assistant);
        assert_eq!(assistant.text(), "");
        assert!(assistant.is_open());
    }

    #[test]
    fn test_empty_submission_rejected() {
        let mut conversation = Conversation::new();
        for text in ["", "   ", "\n\t"] {
            assert_eq!(
                conversation.submit_user_message(text),
                Err(ConversationError::InvalidInput(InputRejection::Empty))
            );
        }
        assert!(conversation.is_empty());
        assert_eq!(conversation.state(), ConversationState::Idle);
    }

    #[test]
    fn test_submit_while_awaiting_rejected() {
        let mut conversation = Conversation::new();
        conversation.submit_user_message("hi").unwrap();

        assert_eq!(
            conversation.submit_user_message("again"),
            Err(ConversationError::InvalidInput(InputRejection::TurnInProgress))
        );
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_too_long_submission_rejected() {
        let mut conversation = Conversation::with_max_input_length(5);
        assert_eq!(
            conversation.submit_user_message("\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}"),
            Err(ConversationError::InvalidInput(InputRejection::TooLong { len: 6, max: 5 }))
        );
        // Counted in characters, not bytes
        assert!(conversation.submit_user_message("\u{e9}\u{e9}\u{e9}\u{e9}\u{e9}").is_ok());
    }

    #[test]
    fn test_append_in_order_then_seal() {
        let mut conversation = Conversation::new();
        let turn = conversation.submit_user_message("hi").unwrap();

        for fragment in ["A", "B", "C"] {
            conversation.append_to_open_assistant(fragment).unwrap();
        }
        assert_eq!(conversation.open_message().unwrap().text(), "ABC");

        let sealed = conversation.seal_open_assistant().unwrap();
        assert_eq!(sealed.id, turn.assistant_id);
        assert!(!sealed.is_open());

        assert_eq!(
            conversation.append_to_open_assistant("D"),
            Err(ConversationError::NoOpenTurn)
        );
        assert_eq!(conversation.get(&turn.assistant_id).unwrap().text(), "ABC");
        assert_eq!(conversation.state(), ConversationState::Idle);
    }

    #[test]
    fn test_append_without_turn() {
        let mut conversation = Conversation::new();
        assert_eq!(
            conversation.append_to_open_assistant("x"),
            Err(ConversationError::NoOpenTurn)
        );
    }

    #[test]
    fn test_seal_is_idempotent() {
        let mut conversation = Conversation::new();
        assert!(conversation.seal_open_assistant().is_none());

        conversation.submit_user_message("hi").unwrap();
        assert!(conversation.seal_open_assistant().is_some());
        assert!(conversation.seal_open_assistant().is_none());
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn test_fail_overwrites_and_returns_to_idle() {
        let mut conversation = Conversation::new();
        conversation.submit_user_message("hi").unwrap();
        conversation.append_to_open_assistant("partial").unwrap();

        let failed = conversation
            .fail_open_assistant("Error: connection reset")
            .unwrap();
        assert_eq!(failed.text(), "Error: connection reset");
        assert!(!failed.is_open());
        assert_eq!(conversation.state(), ConversationState::Idle);

        assert_eq!(
            conversation.fail_open_assistant("again").map(|_| ()),
            Err(ConversationError::NoOpenTurn)
        );

        // Usable again after the failed turn
        conversation.submit_user_message("retry").unwrap();
        assert_eq!(conversation.len(), 4);
    }

    #[test]
    fn test_order_and_timestamps() {
        let mut conversation = Conversation::new();
        for prompt in ["one", "two", "three"] {
            conversation.submit_user_message(prompt).unwrap();
            conversation.append_to_open_assistant("ok").unwrap();
            conversation.seal_open_assistant();
        }

        let senders: Vec<_> = conversation.messages().iter().map(|m| m.sender).collect();
        assert_eq!(
            senders,
            vec![
                Sender::User,
                Sender::Assistant,
                Sender::User,
                Sender::Assistant,
                Sender::User,
                Sender::Assistant,
            ]
        );
        assert!(conversation
            .messages()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(conversation.last_assistant().unwrap().text(), "ok");
    }

    #[test]
    fn test_conversation_id_display() {
        let id = ConversationId::new();
        assert_eq!(id.to_string().len(), 8);
    }
}
