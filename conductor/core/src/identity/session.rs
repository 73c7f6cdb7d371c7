//! In-memory authentication state for one surface.

use super::traits::{AuthRecord, IdentityProvider, UserRecord};

/// Who is logged in, if anyone
#[derive(Clone, Debug, Default)]
pub struct AuthSession {
    current: Option<AuthRecord>,
}

impl AuthSession {
    /// Create a logged-out session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a successful authentication
    pub fn login(&mut self, auth: AuthRecord) {
        tracing::debug!(user_id = %auth.record.id, "Auth session started");
        self.current = Some(auth);
    }

    /// Forget the current user
    pub fn logout(&mut self) {
        if let Some(auth) = self.current.take() {
            tracing::debug!(user_id = %auth.record.id, "Auth session cleared");
        }
    }

    /// Whether a user with a token is stored
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|auth| !auth.token.is_empty())
    }

    /// The logged-in user
    #[must_use]
    pub fn user(&self) -> Option<&UserRecord> {
        self.current.as_ref().map(|auth| &auth.record)
    }

    /// The session token
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.current.as_ref().map(|auth| auth.token.as_str())
    }

    /// Ask the provider whether the stored token is still live; log out if not
    pub async fn validate(&mut self, provider: &dyn IdentityProvider) -> bool {
        let Some(token) = self.token() else {
            return false;
        };
        if provider.is_session_valid(token).await {
            true
        } else {
            tracing::info!("Stored session expired");
            self.logout();
            false
        }
    }
}
