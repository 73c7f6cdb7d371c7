//! Generation Backend Traits
//!
//! A backend turns a [`GenerateRequest`] into a raw byte stream. It does not
//! decode anything: framing and fragment extraction belong to
//! [`crate::stream`], so every backend shares one decoder.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

/// Default generation endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default Ollama port when only a host is given
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;

/// Raw response body of a generation request
pub type ByteStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Errors opening or reading a generation stream
#[derive(Debug, Error)]
pub enum BackendError {
    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request never produced a response
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The response status was not a success
    #[error("API Error ({status}): {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, or the status reason when the body is empty
        body: String,
    },

    /// Reading the response body failed mid-stream
    #[error("stream read failed: {0}")]
    Body(#[source] reqwest::Error),

    /// The connection went away for another reason
    #[error("disconnected: {0}")]
    Disconnected(String),
}

/// Body of a streaming generation request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerateRequest {
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// The prompt to send
    pub prompt: String,
    /// Base64 encoded images, omitted from the body when empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// Whether to stream the response
    pub stream: bool,
}

impl GenerateRequest {
    /// Create a new streaming request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            images: Vec::new(),
            stream: true,
        }
    }

    /// Attach a base64 encoded image
    #[must_use]
    pub fn with_image(mut self, base64: impl Into<String>) -> Self {
        self.images.push(base64.into());
        self
    }
}

/// Generation backend trait
///
/// Implement this trait to add support for different generation services.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Get the backend name (e.g., "Ollama")
    fn name(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Send a request and return the response body as a byte stream
    ///
    /// A non-success status is an error here; nothing is streamed.
    async fn open_stream(&self, request: &GenerateRequest) -> Result<ByteStream, BackendError>;
}

/// Backend connection configuration
#[derive(Clone, Debug, PartialEq)]
pub struct BackendConfig {
    /// Base URL of the generation service
    pub url: String,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_OLLAMA_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl BackendConfig {
    /// Configuration for a base URL with default timeouts
    pub fn new(url: impl AsRef<str>) -> Self {
        Self {
            url: normalize_base_url(url.as_ref(), None),
            ..Default::default()
        }
    }
}

/// Turn `OLLAMA_HOST`-style values into a base URL.
///
/// Accepts full URLs (`http://gpu-box:11434/`), `host:port` and bare hosts.
#[must_use]
pub fn normalize_base_url(host: &str, port: Option<u16>) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        return host.to_string();
    }
    if host.contains(':') {
        return format!("http://{host}");
    }
    let host = if host.is_empty() { "localhost" } else { host };
    format!("http://{host}:{}", port.unwrap_or(DEFAULT_OLLAMA_PORT))
}
