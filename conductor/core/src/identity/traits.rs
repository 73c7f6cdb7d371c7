//! Identity Provider Traits

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default identity service URL
pub const DEFAULT_IDENTITY_URL: &str = "http://127.0.0.1:8090";

/// A registered user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Record ID
    pub id: String,
    /// Email address (may be hidden by the service)
    #[serde(default)]
    pub email: String,
    /// Whether the email address is verified
    #[serde(default)]
    pub verified: bool,
    /// Creation time as reported by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

/// A successful authentication: the user and their bearer token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    /// Session token
    pub token: String,
    /// The authenticated user
    pub record: UserRecord,
}

/// Errors from the identity service
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The service could not be reached
    #[error("Could not reach the identity service: {0}")]
    Request(#[source] reqwest::Error),

    /// Signup confirmation does not match
    #[error("Passwords do not match.")]
    PasswordMismatch,

    /// Login refused
    #[error("Invalid email or password.")]
    InvalidCredentials,

    /// The service answered without a token or record
    #[error("Authentication data is incomplete.")]
    IncompleteAuth,

    /// The service rejected the request
    #[error("{message}")]
    Rejected {
        /// Top-level message
        message: String,
        /// Per-field validation messages, keyed by field name
        fields: BTreeMap<String, String>,
    },
}

impl IdentityError {
    /// Human readable text for a form: field messages joined, else the top-level message
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Rejected { message, fields } if !fields.is_empty() => {
                let joined = fields.values().map(String::as_str).collect::<Vec<_>>().join(" ");
                if joined.trim().is_empty() {
                    message.clone()
                } else {
                    joined
                }
            }
            other => other.to_string(),
        }
    }

    /// Messages for individual form fields
    #[must_use]
    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Rejected { fields, .. } if !fields.is_empty() => Some(fields),
            _ => None,
        }
    }
}

/// Identity provider trait
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Log in with email and password
    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthRecord, IdentityError>;

    /// Create an account
    async fn register(
        &self,
        email: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<UserRecord, IdentityError>;

    /// Whether `token` still identifies a live session
    async fn is_session_valid(&self, token: &str) -> bool;
}

/// Identity service connection configuration
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityConfig {
    /// Base URL of the service
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_IDENTITY_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}
