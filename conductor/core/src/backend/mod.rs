//! Generation Backend Integration
//!
//! Abstracted access to generation services through a common trait.
//!
//! # Available Backends
//!
//! - **Ollama**: Local LLM server (default)
//!
//! # Usage
//!
//! ```ignore
//! use neurorad_core::backend::{BackendConfig, GenerateRequest, GenerationBackend, OllamaBackend};
//! use neurorad_core::stream::decode_fragments;
//!
//! let backend = OllamaBackend::new(&BackendConfig::default())?;
//! let request = GenerateRequest::new("What does this scan show?", "gemma3:12b-it-qat")
//!     .with_image(image.base64());
//! let fragments = decode_fragments(backend.open_stream(&request).await?);
//! ```

mod ollama;
mod traits;

pub use ollama::OllamaBackend;
pub use traits::{
    normalize_base_url, BackendConfig, BackendError, ByteStream, GenerateRequest,
    GenerationBackend, DEFAULT_OLLAMA_PORT, DEFAULT_OLLAMA_URL,
};
