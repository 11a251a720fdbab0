//! # Gatehouse Gateway
//!
//! HTTP gateway: credential store, password hashing, session tokens, the
//! route gate, and the form actions behind it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Form actions and their result mapping.
pub mod actions;
/// Authentication and authorization.
pub mod auth;
/// View invalidation events.
pub mod events;
mod server;

pub use actions::{ActionError, ActionResult, Actions, LoginOutcome};
pub use auth::{
    Argon2Hasher, AuthError, AuthState, CredentialHasher, CredentialStore, JwtManager, PublicUser,
    SledCredentialStore, StoreError, User,
};
pub use events::{EventBroadcaster, UiEvent, UiEventEnvelope};
pub use server::{Gateway, GatewayConfig, GatewayState, router};

/// Start the gateway server.
///
/// # Errors
///
/// Returns error if server fails to start.
pub async fn start(config: GatewayConfig) -> Result<(), GatewayError> {
    let gateway = Gateway::new(config)?;
    gateway.run().await
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Server error.
    #[error("Server error: {0}")]
    Server(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
