//! JWT session tokens.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode};
use rand::RngCore;

use gatehouse_core::SessionClaims;

use super::AuthError;
use super::store::User;

/// JWT manager for creating and validating session tokens.
///
/// Tokens are self-contained: validation never consults the store, and there
/// is no revocation list.
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl JwtManager {
    /// Create a new JWT manager with a secret key.
    ///
    /// The secret should be at least 32 bytes.
    #[must_use]
    pub fn new(secret: &[u8], expiry: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            expiry,
        }
    }

    /// Create a JWT manager from a hex-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns error if hex decoding fails.
    pub fn from_hex_secret(hex_secret: &str, expiry: Duration) -> Result<Self, AuthError> {
        let secret = hex::decode(hex_secret)
            .map_err(|e| AuthError::Config(format!("Invalid hex secret: {e}")))?;
        Ok(Self::new(&secret, expiry))
    }

    /// Generate a random 256-bit secret key.
    #[must_use]
    pub fn generate_secret() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Generate a random secret as hex string.
    #[must_use]
    pub fn generate_hex_secret() -> String {
        hex::encode(Self::generate_secret())
    }

    /// Token lifetime.
    #[must_use]
    pub const fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Derive session claims for a user, valid from now.
    #[must_use]
    pub fn claims_for(&self, user: &User) -> SessionClaims {
        let now = Utc::now().timestamp();
        let lifetime = i64::try_from(self.expiry.as_secs()).unwrap_or(i64::MAX);

        SessionClaims {
            sub: user.id.clone(),
            role: user.role,
            name: user.name.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now.saturating_add(lifetime),
        }
    }

    /// Sign claims into a token.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenError(format!("Encoding failed: {e}")))
    }

    /// Validate and decode a token.
    ///
    /// # Errors
    ///
    /// Returns error if the token is malformed, badly signed or expired.
    pub fn validate(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let validation = Validation::default();

        let token_data: TokenData<SessionClaims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| AuthError::TokenError(format!("Validation failed: {e}")))?;

        Ok(token_data.claims)
    }

    /// Extract token from Authorization header.
    ///
    /// Expects format: "Bearer <token>"
    #[must_use]
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
    }
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}
