//! User records and the credential store.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use thiserror::Error;

use gatehouse_core::{Email, Role, UserId};

const INDEX_PREFIX: &[u8] = b"idx:";

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another record already owns this email.
    #[error("Email already in use: {0}")]
    Conflict(Email),

    /// No record with this ID.
    #[error("User not found: {0}")]
    NotFound(UserId),

    /// The backend failed.
    #[error("Storage error: {0}")]
    Backend(String),
}

/// A stored user account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Normalized email, unique across the store.
    pub email: Email,
    /// Argon2 PHC string. Never leaves the gateway.
    pub password_hash: String,
    /// Account role.
    pub role: Role,
    /// Postal code.
    pub cep: Option<String>,
    /// State.
    pub state: Option<String>,
    /// City.
    pub city: Option<String>,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user with a fresh ID and no address.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: Email,
        password_hash: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: UserId::generate(),
            name: name.into(),
            email,
            password_hash: password_hash.into(),
            role,
            cep: None,
            state: None,
            city: None,
            created_at: Utc::now(),
        }
    }

    /// Create a safe version of user for API responses (no password hash).
    #[must_use]
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            cep: self.cep.clone(),
            state: self.state.clone(),
            city: self.city.clone(),
            created_at: self.created_at,
        }
    }
}

/// Public user representation (for API responses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    /// Unique user ID.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: Email,
    /// Account role.
    pub role: Role,
    /// Postal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cep: Option<String>,
    /// State.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// City.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// When created.
    pub created_at: DateTime<Utc>,
}

/// Persistence for user records.
///
/// Every operation is a single atomic step. Email uniqueness is the store's
/// responsibility: `create` must fail with [`StoreError::Conflict`] even when
/// two callers race past any earlier lookup.
pub trait CredentialStore: Send + Sync {
    /// Look up a user by normalized email.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError>;

    /// Look up a user by ID.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn find_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError>;

    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the email is taken, or a storage error.
    fn create(&self, user: &User) -> Result<(), StoreError>;

    /// Replace an existing user.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent, `Conflict` if the new email is taken.
    fn update(&self, user: &User) -> Result<(), StoreError>;

    /// Remove a user. Returns whether a record was removed.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn delete(&self, id: &UserId) -> Result<bool, StoreError>;

    /// All users, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    fn list(&self) -> Result<Vec<User>, StoreError>;
}

/// User store backed by sled.
///
/// Records live under their ID; `idx:email:<email>` maps each email to its
/// owner. Both keys are written in one transaction.
pub struct SledCredentialStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledCredentialStore {
    /// Open or create a user store at the given path.
    ///
    /// # Errors
    ///
    /// Returns error if database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path.join("credentials"))
            .map_err(|e| StoreError::Backend(format!("Failed to open credential database: {e}")))?;
        Self::with_db(db)
    }

    /// Open a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns error if sled cannot be initialized.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::Backend(format!("Failed to open temporary database: {e}")))?;
        Self::with_db(db)
    }

    /// Create a new user store with an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, StoreError> {
        let tree = db
            .open_tree("users")
            .map_err(|e| StoreError::Backend(format!("Failed to open users tree: {e}")))?;

        Ok(Self { db, tree })
    }

    /// Get the underlying sled database.
    #[must_use]
    pub const fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Count stored users.
    #[must_use]
    pub fn count(&self) -> usize {
        self.tree
            .iter()
            .keys()
            .filter(|k| k.as_ref().is_ok_and(|k| !k.starts_with(INDEX_PREFIX)))
            .count()
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.tree
            .flush()
            .map(|_| ())
            .map_err(|e| StoreError::Backend(format!("Flush error: {e}")))
    }
}

fn email_index_key(email: &Email) -> String {
    format!("idx:email:{email}")
}

fn encode(user: &User) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(user).map_err(|e| StoreError::Backend(format!("Serialization error: {e}")))
}

fn decode(bytes: &[u8]) -> Result<User, StoreError> {
    serde_json::from_slice(bytes)
        .map_err(|e| StoreError::Backend(format!("Deserialization error: {e}")))
}

fn flatten_tx_error(err: TransactionError<StoreError>) -> StoreError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::Backend(format!("Transaction error: {e}")),
    }
}

impl CredentialStore for SledCredentialStore {
    fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        let index_key = email_index_key(email);
        match self.tree.get(index_key.as_bytes()) {
            Ok(Some(id_bytes)) => {
                let id = UserId::new(String::from_utf8_lossy(&id_bytes));
                self.find_by_id(&id)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Backend(format!("Index lookup error: {e}"))),
        }
    }

    fn find_by_id(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        match self.tree.get(id.as_str().as_bytes()) {
            Ok(Some(value)) => decode(&value).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Backend(format!("Get error: {e}"))),
        }
    }

    fn create(&self, user: &User) -> Result<(), StoreError> {
        let value = encode(user)?;
        let index_key = email_index_key(&user.email);
        let id = user.id.as_str().as_bytes();

        self.tree
            .transaction(|tx| {
                if tx.get(index_key.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict(
                        user.email.clone(),
                    )));
                }
                tx.insert(id, value.as_slice())?;
                tx.insert(index_key.as_bytes(), id)?;
                Ok(())
            })
            .map_err(flatten_tx_error)?;

        self.flush()
    }

    fn update(&self, user: &User) -> Result<(), StoreError> {
        let value = encode(user)?;
        let new_index = email_index_key(&user.email);
        let id = user.id.as_str().as_bytes();

        self.tree
            .transaction(|tx| {
                let Some(existing) = tx.get(id)? else {
                    return Err(ConflictableTransactionError::Abort(StoreError::NotFound(
                        user.id.clone(),
                    )));
                };
                let existing = decode(&existing).map_err(ConflictableTransactionError::Abort)?;

                if existing.email != user.email {
                    if tx.get(new_index.as_bytes())?.is_some() {
                        return Err(ConflictableTransactionError::Abort(StoreError::Conflict(
                            user.email.clone(),
                        )));
                    }
                    tx.remove(email_index_key(&existing.email).as_bytes())?;
                    tx.insert(new_index.as_bytes(), id)?;
                }
                tx.insert(id, value.as_slice())?;
                Ok(())
            })
            .map_err(flatten_tx_error)?;

        self.flush()
    }

    fn delete(&self, id: &UserId) -> Result<bool, StoreError> {
        let key = id.as_str().as_bytes();

        let removed = self
            .tree
            .transaction(|tx| {
                let Some(existing) = tx.remove(key)? else {
                    return Ok(false);
                };
                let existing = decode(&existing).map_err(ConflictableTransactionError::Abort)?;
                tx.remove(email_index_key(&existing.email).as_bytes())?;
                Ok(true)
            })
            .map_err(flatten_tx_error)?;

        self.flush()?;
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<User>, StoreError> {
        let mut users = Vec::new();

        for result in self.tree.iter() {
            let (key, value) = result.map_err(|e| StoreError::Backend(format!("Iter error: {e}")))?;

            if key.starts_with(INDEX_PREFIX) {
                continue;
            }

            users.push(decode(&value)?);
        }

        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn user(name: &str, email: &str) -> User {
        User::new(name, Email::new(email), "$argon2id$stub", Role::User)
    }

    #[test]
    fn test_create_and_find() {
        let temp_dir = TempDir::new().unwrap();
        let store = SledCredentialStore::open(temp_dir.path()).unwrap();

        let ana = user("Ana Silva", "ana@mail.com");
        store.create(&ana).unwrap();
        assert_eq!(store.count(), 1);

        let by_id = store.find_by_id(&ana.id).unwrap().unwrap();
        assert_eq!(by_id.name, "Ana Silva");

        let by_email = store
            .find_by_email(&Email::new("ANA@mail.com"))
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, ana.id);
        assert!(store.find_by_email(&Email::new("bia@mail.com")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_conflicts() {
        let store = SledCredentialStore::temporary().unwrap();
        store.create(&user("Ana Silva", "ana@mail.com")).unwrap();

        let result = store.create(&user("Another Ana", "Ana@Mail.com"));
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_update() {
        let store = SledCredentialStore::temporary().unwrap();
        let mut ana = user("Ana Silva", "ana@mail.com");
        store.create(&ana).unwrap();

        ana.name = "Ana Souza".to_string();
        store.update(&ana).unwrap();
        assert_eq!(store.find_by_id(&ana.id).unwrap().unwrap().name, "Ana Souza");

        let ghost = user("Ghost", "ghost@mail.com");
        assert!(matches!(store.update(&ghost), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_update_email_moves_index() {
        let store = SledCredentialStore::temporary().unwrap();
        let mut ana = user("Ana Silva", "ana@mail.com");
        let bia = user("Bia Lima", "bia@mail.com");
        store.create(&ana).unwrap();
        store.create(&bia).unwrap();

        ana.email = Email::new("bia@mail.com");
        assert!(matches!(store.update(&ana), Err(StoreError::Conflict(_))));

        ana.email = Email::new("ana.silva@mail.com");
        store.update(&ana).unwrap();
        assert!(store.find_by_email(&Email::new("ana@mail.com")).unwrap().is_none());
        assert!(store
            .find_by_email(&Email::new("ana.silva@mail.com"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_delete_frees_email() {
        let store = SledCredentialStore::temporary().unwrap();
        let ana = user("Ana Silva", "ana@mail.com");
        store.create(&ana).unwrap();

        assert!(store.delete(&ana.id).unwrap());
        assert!(!store.delete(&ana.id).unwrap());
        assert!(store.find_by_email(&ana.email).unwrap().is_none());

        store.create(&user("Ana Again", "ana@mail.com")).unwrap();
    }

    #[test]
    fn test_list_skips_index() {
        let store = SledCredentialStore::temporary().unwrap();
        store.create(&user("Ana Silva", "ana@mail.com")).unwrap();
        store.create(&user("Bia Lima", "bia@mail.com")).unwrap();

        let users = store.list().unwrap();
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn test_public_user_hides_hash() {
        let ana = user("Ana Silva", "ana@mail.com");
        let json = serde_json::to_string(&ana.to_public()).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"createdAt\""));
    }
}
