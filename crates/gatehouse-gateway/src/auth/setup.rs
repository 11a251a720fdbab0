//! Operator provisioning and start-up seeding.
//!
//! Public registration only ever creates `USER` accounts. The functions here
//! write to the store directly and are the only way an `ADMIN` comes to exist.

use rand::Rng;
use zeroize::Zeroizing;

use gatehouse_core::validation::{
    FieldErrors, check_email, check_name, check_password, sanitize_text,
};
use gatehouse_core::{Email, Role};

use crate::actions::ActionError;

use super::password::CredentialHasher;
use super::store::{CredentialStore, StoreError, User};

/// Environment variable holding the seed admin's email.
pub const ADMIN_EMAIL_ENV: &str = "GATEHOUSE_ADMIN_EMAIL";
/// Environment variable holding the seed admin's password.
pub const ADMIN_PASSWORD_ENV: &str = "GATEHOUSE_ADMIN_PASSWORD";
/// Environment variable holding the seed admin's display name.
pub const ADMIN_NAME_ENV: &str = "GATEHOUSE_ADMIN_NAME";

/// Create an account with an explicit role, bypassing public registration.
///
/// The password must still satisfy the composition rules.
///
/// # Errors
///
/// Returns `Validation` for a bad name, email or password, `Conflict` if the
/// email is taken, or `Internal` on storage or hashing failure.
pub fn provision_user(
    store: &dyn CredentialStore,
    hasher: &dyn CredentialHasher,
    name: &str,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User, ActionError> {
    let name = sanitize_text(name);

    let mut errors = FieldErrors::new();
    check_name(&name, &mut errors);
    check_email(email, &mut errors);
    check_password(password, &mut errors);
    if !errors.is_empty() {
        return Err(ActionError::Validation(errors));
    }

    let digest = hasher.hash(password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        ActionError::Internal
    })?;

    let user = User::new(name, Email::new(email), digest, role);
    store.create(&user).map_err(|e| match e {
        StoreError::Conflict(_) => ActionError::Conflict,
        other => {
            tracing::error!(error = %other, "Failed to provision user");
            ActionError::Internal
        }
    })?;

    tracing::info!(user_id = %user.id, email = %user.email, role = %user.role, "User provisioned");
    Ok(user)
}

/// Seed an admin from environment variables.
///
/// Reads `GATEHOUSE_ADMIN_EMAIL` and `GATEHOUSE_ADMIN_PASSWORD` (and optionally
/// `GATEHOUSE_ADMIN_NAME`). Does nothing unless both are set, and leaves an
/// existing account with that email untouched.
///
/// # Errors
///
/// Returns error if the lookup or creation fails.
pub fn seed_admin_from_env(
    store: &dyn CredentialStore,
    hasher: &dyn CredentialHasher,
) -> Result<Option<User>, ActionError> {
    let email = match std::env::var(ADMIN_EMAIL_ENV) {
        Ok(e) if !e.trim().is_empty() => e,
        _ => return Ok(None),
    };

    let password = match std::env::var(ADMIN_PASSWORD_ENV) {
        Ok(p) if !p.is_empty() => Zeroizing::new(p),
        _ => return Ok(None),
    };

    let name = std::env::var(ADMIN_NAME_ENV).unwrap_or_else(|_| "Administrator".to_string());

    seed_admin(store, hasher, &name, &email, &password)
}

/// Create an admin unless an account with `email` already exists.
///
/// # Errors
///
/// Returns error if the lookup or creation fails.
pub fn seed_admin(
    store: &dyn CredentialStore,
    hasher: &dyn CredentialHasher,
    name: &str,
    email: &str,
    password: &str,
) -> Result<Option<User>, ActionError> {
    let normalized = Email::new(email);
    let existing = store.find_by_email(&normalized).map_err(|e| {
        tracing::error!(error = %e, "Admin seed lookup failed");
        ActionError::Internal
    })?;

    if existing.is_some() {
        tracing::debug!(email = %normalized, "Seed admin already present");
        return Ok(None);
    }

    let admin = provision_user(store, hasher, name, email, password, Role::Admin)?;
    tracing::info!(user_id = %admin.id, "Admin user created from environment variables");
    Ok(Some(admin))
}

/// Generate a random password that satisfies the composition rules.
#[must_use]
pub fn generate_password(length: usize) -> Zeroizing<String> {
    const CHARSET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";
    let length = length.max(8);
    let mut rng = rand::thread_rng();

    loop {
        let candidate: Zeroizing<String> = Zeroizing::new(
            (0..length)
                .map(|_| char::from(CHARSET[rng.gen_range(0..CHARSET.len())]))
                .collect(),
        );

        let mut errors = FieldErrors::new();
        check_password(&candidate, &mut errors);
        if errors.is_empty() {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Argon2Hasher, SledCredentialStore};
    use gatehouse_core::config::HashingConfig;

    fn fixtures() -> (SledCredentialStore, Argon2Hasher) {
        let hasher = Argon2Hasher::new(HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        (SledCredentialStore::temporary().unwrap(), hasher)
    }

    #[test]
    fn test_provision_admin() {
        let (store, hasher) = fixtures();
        let admin =
            provision_user(&store, &hasher, "Root Admin", "Root@Mail.com", "Secret123", Role::Admin)
                .unwrap();

        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.email.as_str(), "root@mail.com");
        assert!(hasher.verify("Secret123", &admin.password_hash).unwrap());
    }

    #[test]
    fn test_provision_rejects_weak_password() {
        let (store, hasher) = fixtures();
        let result = provision_user(&store, &hasher, "Root", "root@mail.com", "weak", Role::Admin);
        assert!(matches!(result, Err(ActionError::Validation(_))));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_provision_conflict() {
        let (store, hasher) = fixtures();
        provision_user(&store, &hasher, "Root", "root@mail.com", "Secret123", Role::Admin).unwrap();
        let again = provision_user(&store, &hasher, "Root", "ROOT@mail.com", "Secret123", Role::User);
        assert!(matches!(again, Err(ActionError::Conflict)));
    }

    #[test]
    fn test_seed_admin_is_idempotent() {
        let (store, hasher) = fixtures();
        let first = seed_admin(&store, &hasher, "Root", "root@mail.com", "Secret123").unwrap();
        assert!(first.is_some());

        let second = seed_admin(&store, &hasher, "Root", "root@mail.com", "Other123").unwrap();
        assert!(second.is_none());
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_generate_password() {
        let password = generate_password(20);
        assert_eq!(password.len(), 20);

        let mut errors = FieldErrors::new();
        check_password(&password, &mut errors);
        assert!(errors.is_empty());

        assert_eq!(generate_password(2).len(), 8);
    }
}
