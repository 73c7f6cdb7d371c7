//! PocketBase Identity Implementation
//!
//! Talks to the `users` auth collection of a PocketBase instance:
//!
//! - `POST /api/collections/users/auth-with-password` - login
//! - `POST /api/collections/users/records` - signup
//! - `POST /api/collections/users/auth-refresh` - session validity
//!
//! Error bodies look like
//! `{"code":400,"message":"...","data":{"email":{"code":"...","message":"..."}}}`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::traits::{AuthRecord, IdentityConfig, IdentityError, IdentityProvider, UserRecord};

const USERS_COLLECTION: &str = "/api/collections/users";

/// PocketBase identity client
#[derive(Clone, Debug)]
pub struct PocketBaseIdentity {
    base_url: String,
    http_client: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: BTreeMap<String, FieldError>,
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    message: String,
}

impl PocketBaseIdentity {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Client`] if the HTTP client cannot be built.
    pub fn new(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(IdentityError::Client)?;

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

    fn collection_url(&self, path: &str) -> String {
        format!("{}{USERS_COLLECTION}{path}", self.base_url)
    }
}

/// Map a PocketBase error response to [`IdentityError::Rejected`]
fn rejection(status: StatusCode, body: &str) -> IdentityError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => {
            let fields = parsed
                .data
                .into_iter()
                .filter(|(_, e)| !e.message.is_empty())
                .map(|(field, e)| (field, e.message))
                .collect();
            let message = if parsed.message.is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                parsed.message
            };
            IdentityError::Rejected { message, fields }
        }
        Err(_) => IdentityError::Rejected {
            message: if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                body.trim().to_string()
            },
            fields: BTreeMap::new(),
        },
    }
}

#[async_trait]
impl IdentityProvider for PocketBaseIdentity {
    fn name(&self) -> &str {
        "PocketBase"
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthRecord, IdentityError> {
        let response = self
            .http_client
            .post(self.collection_url("/auth-with-password"))
            .json(&serde_json::json!({
                "identity": email,
                "password": password,
            }))
            .send()
            .await
            .map_err(IdentityError::Request)?;

        let status = response.status();
        let body = response.text().await.map_err(IdentityError::Request)?;

        if status == StatusCode::BAD_REQUEST {
            tracing::info!(email = %email, "Login refused");
            return Err(IdentityError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(rejection(status, &body));
        }

        let auth: AuthRecord =
            serde_json::from_str(&body).map_err(|_| IdentityError::IncompleteAuth)?;
        if auth.token.is_empty() || auth.record.id.is_empty() {
            return Err(IdentityError::IncompleteAuth);
        }

        tracing::info!(user_id = %auth.record.id, "Logged in");
        Ok(auth)
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<UserRecord, IdentityError> {
        if password != password_confirm {
            return Err(IdentityError::PasswordMismatch);
        }

        let response = self
            .http_client
            .post(self.collection_url("/records"))
            .json(&serde_json::json!({
                "email": email,
                "emailVisibility": true,
                "password": password,
                "passwordConfirm": password_confirm,
            }))
            .send()
            .await
            .map_err(IdentityError::Request)?;

        let status = response.status();
        let body = response.text().await.map_err(IdentityError::Request)?;
        if !status.is_success() {
            let err = rejection(status, &body);
            tracing::info!(email = %email, reason = %err.display_message(), "Signup rejected");
            return Err(err);
        }

        let record: UserRecord = serde_json::from_str(&body).map_err(|_| IdentityError::Rejected {
            message: "An unexpected error occurred during signup.".to_string(),
            fields: BTreeMap::new(),
        })?;
        tracing::info!(user_id = %record.id, "Registered user");
        Ok(record)
    }

    async fn is_session_valid(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        match self
            .http_client
            .post(self.collection_url("/auth-refresh"))
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Session validity check failed");
                false
            }
        }
    }
}
