//! Ollama Backend Implementation
//!
//! Generation backend for Ollama (local LLM server).
//!
//! # Ollama API
//!
//! - `/api/generate` - Generate completions; with `"stream": true` the body
//!   is newline-delimited JSON, one frame per line
//! - `/api/tags` - List available models (used as a health probe)
//!
//! Vision models take base64 images in the `images` array of the request.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};

use super::traits::{BackendConfig, BackendError, ByteStream, GenerateRequest, GenerationBackend};

/// Ollama backend client
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        // No overall timeout: a response may stream for minutes
        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(BackendError::Client)?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get generate endpoint URL
    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Get tags endpoint URL
    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(self.tags_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, url = %self.base_url, "Ollama health check failed");
                false
            }
        }
    }

    async fn open_stream(&self, request: &GenerateRequest) -> Result<ByteStream, BackendError> {
        tracing::info!(
            model = %request.model,
            images = request.images.len(),
            prompt_chars = request.prompt.chars().count(),
            "Sending generation request"
        );

        let response = self
            .http_client
            .post(self.generate_url())
            .json(request)
            .send()
            .await
            .map_err(BackendError::Request)?;

        // Check for HTTP errors
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown status").to_string()
            } else {
                body.trim().to_string()
            };
            tracing::warn!(status = status.as_u16(), body = %body, "Generation request rejected");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes_stream().map_err(BackendError::Body).boxed())
    }
}
