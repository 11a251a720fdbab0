//! Password hashing.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use gatehouse_core::config::HashingConfig;

use super::AuthError;

/// One-way salted hashing with constant-time verification.
pub trait CredentialHasher: Send + Sync {
    /// Hash a plaintext password into a self-describing digest.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails.
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    /// Check a plaintext password against a stored digest.
    ///
    /// # Errors
    ///
    /// Returns error if the digest is malformed. A mismatch is `Ok(false)`.
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError>;

    /// Burn the same work as a real verification against a throwaway digest.
    ///
    /// Called when no account matches so response timing does not reveal
    /// whether an email is registered.
    fn verify_dummy(&self, plaintext: &str);
}

/// Argon2id hasher with fixed per-deployment cost.
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
    dummy_digest: String,
}

impl Argon2Hasher {
    /// Create a hasher with the given cost parameters.
    ///
    /// # Errors
    ///
    /// Returns error if the parameters are out of range.
    pub fn new(config: HashingConfig) -> Result<Self, AuthError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| AuthError::Config(format!("Invalid argon2 parameters: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let salt = SaltString::generate(&mut OsRng);
        let dummy_digest = argon2
            .hash_password(b"gatehouse-dummy-credential", &salt)
            .map_err(|e| AuthError::Hashing(format!("Password hashing failed: {e}")))?
            .to_string();

        Ok(Self {
            argon2,
            dummy_digest,
        })
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Hashing(format!("Password hashing failed: {e}")))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AuthError> {
        let parsed_hash =
            PasswordHash::new(digest).map_err(|e| AuthError::Hashing(format!("Invalid hash: {e}")))?;

        match self.argon2.verify_password(plaintext.as_bytes(), &parsed_hash) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Hashing(format!("Verification failed: {e}"))),
        }
    }

    fn verify_dummy(&self, plaintext: &str) {
        let _ = self.verify(plaintext, &self.dummy_digest);
    }
}

impl std::fmt::Debug for Argon2Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2Hasher").finish_non_exhaustive()
    }
}
