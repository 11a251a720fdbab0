//! Authentication for the gateway.
//!
//! This module provides:
//! - The credential store (sled-backed) and its record types
//! - Argon2 password hashing and verification
//! - JWT session token issuance and validation
//! - The route gate middleware and claim extractors
//! - Operator provisioning and environment seeding

mod jwt;
mod middleware;
mod password;
/// Operator provisioning and start-up seeding.
pub mod setup;
mod store;

pub use jwt::JwtManager;
pub use middleware::{
    AuthState, OptionalAuth, RequireAdmin, RequireAuth, clear_session_cookie, extract_token,
    route_gate, session_cookie,
};
pub use password::{Argon2Hasher, CredentialHasher};
pub use store::{CredentialStore, PublicUser, SledCredentialStore, StoreError, User};

use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Token error (expired, invalid signature, malformed).
    #[error("Token error: {0}")]
    TokenError(String),

    /// Hashing failed or a stored digest could not be parsed.
    #[error("Hashing error: {0}")]
    Hashing(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}
