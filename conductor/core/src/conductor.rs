//! Conductor - The Orchestration Core
//!
//! The Conductor drives one conversation against one generation backend:
//! - validates and submits user turns
//! - opens the generation stream and decodes it into fragments
//! - applies fragments to the open assistant turn in order
//! - tells the surface what happened through [`ConductorMessage`]s
//!
//! The Conductor is UI-agnostic. A terminal, a web page or a test harness
//! all see the same message sequence:
//!
//! ```text
//! Message(user) → StreamStart → Token* → StreamEnd | StreamError
//! ```
//!
//! Streaming is pull-based: after [`Conductor::send_message`] the caller
//! drives the open turn with [`Conductor::poll_streaming`] (one fragment per
//! call) or [`Conductor::run_turn`] (to completion). Dropping the future of
//! either between fragments is safe; [`Conductor::cancel`] then seals the
//! turn with whatever text arrived.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::backend::{GenerateRequest, GenerationBackend};
use crate::config::NeuroradConfig;
use crate::conversation::{Conversation, ConversationError, ConversationState};
use crate::image::ImageAttachment;
use crate::messages::{
    ConductorMessage, ConductorState, MessageId, NotifyLevel, ResponseMetadata, Sender,
};
use crate::stream::{decode_fragments, Fragment, FrameUsage, StreamError};

/// Shown when a prompt is sent without the required image
pub const IMAGE_REQUIRED_MESSAGE: &str = "Please upload an image before sending a message.";

/// Conductor configuration
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// Model to use
    pub model: String,
    /// Refuse prompts without an attached image
    pub require_image: bool,
    /// Maximum input length in characters (0 = unlimited)
    pub max_input_length: usize,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        let config = NeuroradConfig::default();
        Self::from(&config)
    }
}

impl From<&NeuroradConfig> for ConductorConfig {
    fn from(config: &NeuroradConfig) -> Self {
        Self {
            model: config.model.clone(),
            require_image: config.require_image,
            max_input_length: config.max_input_length,
        }
    }
}

/// Errors returned to the caller of a conductor operation
///
/// Generation failures are not errors here: they are recorded in the
/// conversation and reported as [`ConductorMessage::StreamError`].
#[derive(Debug, Error)]
pub enum ConductorError {
    /// The conversation rejected the operation
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    /// An image must be attached before sending
    #[error("{IMAGE_REQUIRED_MESSAGE}")]
    ImageRequired,

    /// The attachment cannot change while a response is streaming
    #[error("cannot change the attached image while a response is streaming")]
    Busy,
}

type FragmentStream = BoxStream<'static, Result<Fragment, StreamError>>;

/// The turn currently receiving fragments
struct ActiveTurn {
    message_id: MessageId,
    fragments: FragmentStream,
    started: Instant,
    fragment_count: u32,
    usage: Option<FrameUsage>,
}

impl ActiveTurn {
    fn metadata(&self) -> ResponseMetadata {
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut metadata = ResponseMetadata::with_timing(elapsed_ms, self.fragment_count);
        if let Some(usage) = self.usage {
            metadata.prompt_eval_count = usage.prompt_eval_count;
            metadata.eval_count = usage.eval_count;
            metadata.total_duration_ns = usage.total_duration_ns;
        }
        metadata
    }
}

/// The Conductor - headless orchestration core
pub struct Conductor<B: GenerationBackend> {
    config: ConductorConfig,
    backend: Arc<B>,
    conversation: Conversation,
    image: Option<ImageAttachment>,
    state: ConductorState,
    active: Option<ActiveTurn>,
    tx: mpsc::Sender<ConductorMessage>,
}

impl<B: GenerationBackend + 'static> Conductor<B> {
    /// Create a new Conductor with the given backend
    pub fn new(backend: B, config: ConductorConfig, tx: mpsc::Sender<ConductorMessage>) -> Self {
        let conversation = Conversation::with_max_input_length(config.max_input_length);
        tracing::debug!(
            conversation = %conversation.id(),
            backend = backend.name(),
            model = %config.model,
            "Conductor created"
        );

        Self {
            config,
            backend: Arc::new(backend),
            conversation,
            image: None,
            state: ConductorState::Ready,
            active: None,
            tx,
        }
    }

    /// Check the backend and announce readiness
    ///
    /// An unreachable backend is reported as a warning; sending still works
    /// once it comes up.
    pub async fn start(&mut self) {
        if self.backend.health_check().await {
            tracing::info!(backend = self.backend.name(), "Backend is reachable");
        } else {
            tracing::warn!(backend = self.backend.name(), "Backend health check failed");
            self.notify(
                NotifyLevel::Warning,
                &format!("{} is not reachable yet", self.backend.name()),
            )
            .await;
        }
        self.set_state(ConductorState::Ready).await;
    }

    /// Get current state
    pub fn state(&self) -> ConductorState {
        self.state
    }

    /// Get the configuration
    pub fn config(&self) -> &ConductorConfig {
        &self.config
    }

    /// Get the backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get the conversation
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The attached image, if any
    pub fn image(&self) -> Option<&ImageAttachment> {
        self.image.as_ref()
    }

    /// Whether a turn is open
    pub fn is_streaming(&self) -> bool {
        self.conversation.state() == ConversationState::AwaitingResponse
    }

    /// Attach an image to subsequent prompts, replacing any previous one
    ///
    /// # Errors
    ///
    /// [`ConductorError::Busy`] while a turn is open.
    pub fn attach_image(&mut self, image: ImageAttachment) -> Result<(), ConductorError> {
        if self.is_streaming() {
            return Err(ConductorError::Busy);
        }
        tracing::info!(name = image.name(), size_kb = image.size_kb(), "Image attached");
        self.image = Some(image);
        Ok(())
    }

    /// Remove the attached image
    ///
    /// # Errors
    ///
    /// [`ConductorError::Busy`] while a turn is open.
    pub fn clear_image(&mut self) -> Result<Option<ImageAttachment>, ConductorError> {
        if self.is_streaming() {
            return Err(ConductorError::Busy);
        }
        Ok(self.image.take())
    }

    /// Submit a user message and open the generation stream
    ///
    /// Returns the id of the new assistant turn. If the stream cannot be
    /// opened the turn is already failed (and reported) when this returns.
    ///
    /// # Errors
    ///
    /// [`ConductorError::ImageRequired`] or a rejected submission. Nothing
    /// is appended to the conversation in either case.
    pub async fn send_message(&mut self, text: &str) -> Result<MessageId, ConductorError> {
        if self.config.require_image && self.image.is_none() && !self.is_streaming() {
            return Err(ConductorError::ImageRequired);
        }

        let turn = self.conversation.submit_user_message(text)?;
        let prompt = self
            .conversation
            .get(&turn.user_id)
            .map(|m| m.text().to_string())
            .unwrap_or_default();

        self.send(ConductorMessage::Message {
            id: turn.user_id.clone(),
            sender: Sender::User,
            content: prompt.clone(),
        })
        .await;
        self.send(ConductorMessage::StreamStart {
            message_id: turn.assistant_id.clone(),
        })
        .await;
        self.set_state(ConductorState::Thinking).await;

        let mut request = GenerateRequest::new(prompt, &self.config.model);
        if let Some(ref image) = self.image {
            request = request.with_image(image.base64());
        }

        tracing::info!(
            conversation = %self.conversation.id(),
            message_id = %turn.assistant_id,
            model = %request.model,
            images = request.images.len(),
            "Sending prompt"
        );

        match self.backend.open_stream(&request).await {
            Ok(bytes) => {
                self.active = Some(ActiveTurn {
                    message_id: turn.assistant_id.clone(),
                    fragments: decode_fragments(bytes).boxed(),
                    started: Instant::now(),
                    fragment_count: 0,
                    usage: None,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open generation stream");
                self.fail_turn(&turn.assistant_id, &e.to_string()).await;
            }
        }

        Ok(turn.assistant_id)
    }

    /// Apply the next fragment of the open turn
    ///
    /// Returns `true` while the turn is still open, `false` once it has
    /// ended (or when nothing was streaming).
    pub async fn poll_streaming(&mut self) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };

        match active.fragments.next().await {
            Some(Ok(fragment)) => {
                self.apply_fragment(fragment).await;
                true
            }
            Some(Err(e)) => {
                if let Some(turn) = self.active.take() {
                    self.fail_turn(&turn.message_id, &e.to_string()).await;
                }
                false
            }
            None => {
                self.finish_turn().await;
                false
            }
        }
    }

    /// Drive the open turn until it is sealed or failed
    pub async fn run_turn(&mut self) {
        while self.poll_streaming().await {}
    }

    /// Stop the open turn, keeping the text received so far
    ///
    /// Returns `false` when nothing was streaming.
    pub async fn cancel(&mut self) -> bool {
        if self.active.is_none() && !self.is_streaming() {
            return false;
        }
        tracing::info!(conversation = %self.conversation.id(), "Cancelling open turn");
        self.finish_turn().await;
        true
    }

    async fn apply_fragment(&mut self, fragment: Fragment) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if fragment.usage.is_some() {
            active.usage = fragment.usage;
        }
        if fragment.text.is_empty() {
            return;
        }

        active.fragment_count += 1;
        let message_id = active.message_id.clone();
        let first = active.fragment_count == 1;

        if let Err(e) = self.conversation.append_to_open_assistant(&fragment.text) {
            tracing::warn!(error = %e, "Fragment arrived with no open turn");
            return;
        }
        if first {
            self.set_state(ConductorState::Responding).await;
        }
        self.send(ConductorMessage::Token {
            message_id,
            text: fragment.text,
        })
        .await;
    }

    /// Seal the open turn and report it
    async fn finish_turn(&mut self) {
        let turn = self.active.take();
        let Some(sealed) = self.conversation.seal_open_assistant() else {
            return;
        };
        let message_id = sealed.id.clone();
        let final_content = sealed.text().to_string();

        let metadata = turn
            .as_ref()
            .map(ActiveTurn::metadata)
            .unwrap_or_default();
        tracing::info!(
            message_id = %message_id,
            elapsed_ms = metadata.elapsed_ms,
            fragments = metadata.fragment_count,
            eval_count = metadata.eval_count.unwrap_or(0),
            "Turn complete"
        );

        self.send(ConductorMessage::StreamEnd {
            message_id,
            final_content,
            metadata,
        })
        .await;
        self.set_state(ConductorState::Ready).await;
    }

    /// Replace the open turn's text with the failure and report it
    async fn fail_turn(&mut self, message_id: &MessageId, reason: &str) {
        self.active = None;
        let error = format!("Error: {reason}");
        if let Err(e) = self.conversation.fail_open_assistant(error.clone()) {
            tracing::warn!(error = %e, "No open turn to fail");
        }
        self.send(ConductorMessage::StreamError {
            message_id: message_id.clone(),
            error,
        })
        .await;
        self.set_state(ConductorState::Ready).await;
    }

    /// Set state and notify the surface
    async fn set_state(&mut self, state: ConductorState) {
        self.state = state;
        self.send(ConductorMessage::State { state }).await;
    }

    /// Send notification
    async fn notify(&self, level: NotifyLevel, message: &str) {
        self.send(ConductorMessage::Notify {
            level,
            message: message.to_string(),
        })
        .await;
    }

    /// Send a message to the surface
    async fn send(&self, msg: ConductorMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::warn!("Failed to send message to surface: {}", e);
        }
    }
}
