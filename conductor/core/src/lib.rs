//! Neurorad Core - Headless Streaming Chat for a Local Vision Model
//!
//! This crate provides the core of the neurorad chat assistant, independent
//! of any UI. A user submits a prompt (optionally with a medical image), the
//! prompt goes to an Ollama-compatible `/api/generate` endpoint, and the
//! newline-delimited JSON reply is decoded incrementally into the open
//! assistant turn of an in-memory conversation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Surfaces                             │
//! │        terminal chat  ·  web page  ·  test harness           │
//! │                            ▲                                 │
//! │                  ConductorMessage (down)                     │
//! └────────────────────────────┼─────────────────────────────────┘
//!                              │
//! ┌────────────────────────────┼─────────────────────────────────┐
//! │                       NEURORAD CORE                          │
//! │  ┌─────────────────────────┴──────────────────────────────┐  │
//! │  │                       Conductor                        │  │
//! │  │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  │  │
//! │  │  │ Conversation │◀─│    Stream    │◀─│   Backend    │  │  │
//! │  │  │    Model     │  │   Decoder    │  │   (Ollama)   │  │  │
//! │  │  └──────────────┘  └──────────────┘  └──────────────┘  │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │        Identity (PocketBase)  ·  Image  ·  Config            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use neurorad_core::{load_config, Conductor, ConductorConfig, OllamaBackend};
//! use tokio::sync::mpsc;
//!
//! let config = load_config()?;
//! let backend = OllamaBackend::new(&config.backend_config())?;
//! let (tx, mut rx) = mpsc::channel(100);
//! let mut conductor = Conductor::new(backend, ConductorConfig::from(&config), tx);
//!
//! conductor.send_message("What does this scan show?").await?;
//! conductor.run_turn().await;
//!
//! while let Ok(msg) = rx.try_recv() {
//!     // render
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`stream`]: incremental NDJSON decoding into fragments
//! - [`conversation`]: the conversation model and its state machine
//! - [`backend`]: generation backend abstraction (Ollama)
//! - [`conductor`]: ties a backend, the decoder and a conversation together
//! - [`messages`]: messages from the Conductor to surfaces
//! - [`identity`]: login, signup and session validity (PocketBase)
//! - [`image`]: image attachments
//! - [`config`]: TOML file, environment and CLI configuration

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod conversation;
pub mod identity;
pub mod image;
pub mod messages;
pub mod stream;

// Re-exports for convenience
pub use backend::{BackendConfig, BackendError, GenerateRequest, GenerationBackend, OllamaBackend};
pub use conductor::{Conductor, ConductorConfig, ConductorError};
pub use conversation::{
    ChatMessage, Conversation, ConversationError, ConversationId, ConversationState,
    InputRejection, SubmittedTurn,
};
pub use image::{ImageAttachment, ImageError};
pub use messages::{
    ConductorMessage, ConductorState, MessageId, NotifyLevel, ResponseMetadata, Sender,
};
pub use stream::{decode_fragments, DecodedLine, Fragment, FrameDecoder, StreamError, StreamFrame};

// Identity exports
pub use identity::{
    AuthRecord, AuthSession, IdentityConfig, IdentityError, IdentityProvider, PocketBaseIdentity,
    UserRecord,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, NeuroradConfig, NeuroradToml,
};
