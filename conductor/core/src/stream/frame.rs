//! Wire frames of the generation stream.
//!
//! One JSON object per line, shaped like Ollama's `/api/generate` stream
//! chunks. Only `response` and `done` matter for decoding; the rest is
//! carried so the final frame's statistics can reach the surface.

use serde::{Deserialize, Serialize};

/// One newline-delimited JSON frame from the generation endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    /// Text fragment (may be empty)
    #[serde(default)]
    pub response: String,
    /// Logical completion marker; decoding still runs to end of stream
    #[serde(default)]
    pub done: bool,
    /// Model that produced the frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Backend timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Why generation stopped (`stop`, `length`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Opaque context tokens returned on the final frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    /// Total backend time in nanoseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<u64>,
    /// Model load time in nanoseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_duration: Option<u64>,
    /// Prompt tokens evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Prompt evaluation time in nanoseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_duration: Option<u64>,
    /// Tokens generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    /// Generation time in nanoseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_duration: Option<u64>,
    /// Error reported in-band by the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamFrame {
    /// Frame carrying a text fragment
    #[must_use]
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Default::default()
        }
    }

    /// Final frame with no text
    #[must_use]
    pub fn done() -> Self {
        Self {
            done: true,
            ..Default::default()
        }
    }

    /// Token usage, when the frame reports any
    #[must_use]
    pub fn usage(&self) -> Option<FrameUsage> {
        if self.prompt_eval_count.is_none()
            && self.eval_count.is_none()
            && self.total_duration.is_none()
        {
            return None;
        }
        Some(FrameUsage {
            prompt_eval_count: self.prompt_eval_count,
            eval_count: self.eval_count,
            total_duration_ns: self.total_duration,
        })
    }
}

/// Usage statistics reported by a (usually final) frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameUsage {
    /// Prompt tokens evaluated
    pub prompt_eval_count: Option<u64>,
    /// Tokens generated
    pub eval_count: Option<u64>,
    /// Total backend time in nanoseconds
    pub total_duration_ns: Option<u64>,
}
