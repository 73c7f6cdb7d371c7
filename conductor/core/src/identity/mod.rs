//! Identity and Session Collaborators
//!
//! Login, signup and session validity against an external identity service.
//! The chat core never interprets these errors beyond showing
//! [`IdentityError::display_message`] to the user.
//!
//! # Available Providers
//!
//! - **PocketBase**: `users` auth collection

mod pocketbase;
mod session;
mod traits;

pub use pocketbase::PocketBaseIdentity;
pub use session::AuthSession;
pub use traits::{
    AuthRecord, IdentityConfig, IdentityError, IdentityProvider, UserRecord, DEFAULT_IDENTITY_URL,
};
