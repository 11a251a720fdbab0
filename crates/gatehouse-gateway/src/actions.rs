//! Action handlers.
//!
//! Each action validates its input, talks to the credential store, hasher or
//! token issuer, and returns either a value or an [`ActionError`]. Actions are
//! synchronous; the HTTP layer runs them on the blocking pool. Claims are
//! always passed in explicitly.

use std::sync::Arc;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use zeroize::Zeroizing;

use gatehouse_core::{
    FieldErrors, LoginForm, RegisterForm, Role, SessionClaims, UpdateNameForm, UserId,
};

use crate::auth::{AuthState, CredentialHasher, CredentialStore, PublicUser, StoreError, User};
use crate::events::{EventBroadcaster, UiEvent};

/// Form-level message for bad credentials. Identical for unknown emails and
/// wrong passwords.
pub const INVALID_CREDENTIALS: &str = "invalid credentials";
/// Form-level message for a taken email.
pub const EMAIL_IN_USE: &str = "email already in use";
/// Form-level message for unexpected failures.
pub const GENERIC_FAILURE: &str = "something went wrong, please try again";
/// Message for a failed admin rename.
pub const UPDATE_FAILED: &str = "failed to update user";
/// Message for a failed admin delete.
pub const DELETE_FAILED: &str = "failed to delete user";

/// Action failures.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Input failed field validation.
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    /// The email is already registered.
    #[error("email already in use")]
    Conflict,

    /// Credentials did not match an account.
    #[error("invalid credentials")]
    Authentication,

    /// The caller lacks the required role.
    #[error("unauthorized")]
    Unauthorized,

    /// An admin tried to delete their own account.
    #[error("you cannot delete your own account")]
    SelfDeletion,

    /// The target record does not exist. Carries the message to show.
    #[error("{0}")]
    NotFound(&'static str),

    /// A store or hashing failure during an admin operation. Carries the
    /// message to show; detail has already been logged.
    #[error("{0}")]
    Failed(&'static str),

    /// Unexpected failure during a public form action.
    #[error("something went wrong, please try again")]
    Internal,
}

impl ActionError {
    /// HTTP status for this failure.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Unauthorized | Self::SelfDeletion => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Failed(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Structured outcome returned to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    /// Whether the action succeeded.
    pub success: bool,
    /// Per-field errors; form-level ones under `_form`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResult {
    /// A successful result with a message.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            errors: None,
            message: Some(message.into()),
        }
    }
}

impl From<ActionError> for ActionResult {
    fn from(err: ActionError) -> Self {
        let (errors, message) = match err {
            ActionError::Validation(fields) => (Some(fields), None),
            ActionError::Conflict => (Some(FieldErrors::form(EMAIL_IN_USE)), None),
            ActionError::Authentication => (Some(FieldErrors::form(INVALID_CREDENTIALS)), None),
            ActionError::Internal => (Some(FieldErrors::form(GENERIC_FAILURE)), None),
            other @ (ActionError::Unauthorized
            | ActionError::SelfDeletion
            | ActionError::NotFound(_)
            | ActionError::Failed(_)) => (None, Some(other.to_string())),
        };

        Self {
            success: false,
            errors,
            message,
        }
    }
}

impl IntoResponse for ActionError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ActionResult::from(self))).into_response()
    }
}

/// A successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Claims baked into the token.
    pub claims: SessionClaims,
    /// Signed session token, to be set as a cookie.
    pub token: String,
}

/// The action handlers and their collaborators.
#[derive(Clone)]
pub struct Actions {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn CredentialHasher>,
    auth: Arc<AuthState>,
    events: EventBroadcaster,
}

impl Actions {
    /// Wire up the handlers.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn CredentialHasher>,
        auth: Arc<AuthState>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            store,
            hasher,
            auth,
            events,
        }
    }

    /// The credential store.
    #[must_use]
    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    /// Register a new `USER` account. No token is issued.
    ///
    /// # Errors
    ///
    /// `Validation` for bad input, `Conflict` for a taken email, `Internal`
    /// for anything else.
    pub fn register(&self, form: RegisterForm) -> Result<PublicUser, ActionError> {
        let registration = form.validated().map_err(ActionError::Validation)?;
        let password = Zeroizing::new(registration.password);

        match self.store.find_by_email(&registration.email) {
            Ok(Some(_)) => return Err(ActionError::Conflict),
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Registration lookup failed");
                return Err(ActionError::Internal);
            }
        }

        let digest = self.hasher.hash(&password).map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ActionError::Internal
        })?;

        let mut user = User::new(
            registration.name,
            registration.email,
            digest,
            Role::User,
        );
        user.cep = registration.cep;
        user.state = registration.state;
        user.city = registration.city;

        self.store.create(&user).map_err(|e| match e {
            StoreError::Conflict(_) => ActionError::Conflict,
            other => {
                tracing::error!(error = %other, "Failed to create user");
                ActionError::Internal
            }
        })?;

        tracing::info!(user_id = %user.id, email = %user.email, "User registered");
        self.events.broadcast(UiEvent::users_changed());
        Ok(user.to_public())
    }

    /// Verify credentials and issue a session token.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed input; `Authentication` for every other
    /// failure, including ones that were logged as internal errors.
    pub fn login(&self, form: LoginForm) -> Result<LoginOutcome, ActionError> {
        let credentials = form.validated().map_err(ActionError::Validation)?;
        let password = Zeroizing::new(credentials.password);

        let user = match self.store.find_by_email(&credentials.email) {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(error = %e, "Login lookup failed");
                return Err(ActionError::Authentication);
            }
        };

        let Some(user) = user else {
            self.hasher.verify_dummy(&password);
            tracing::debug!(email = %credentials.email, "Login for unknown email");
            return Err(ActionError::Authentication);
        };

        match self.hasher.verify(&password, &user.password_hash) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(user_id = %user.id, "Login with wrong password");
                return Err(ActionError::Authentication);
            }
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Password verification failed");
                return Err(ActionError::Authentication);
            }
        }

        let claims = self.auth.jwt.claims_for(&user);
        let token = self.auth.jwt.issue(&claims).map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Token issuance failed");
            ActionError::Authentication
        })?;

        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
        Ok(LoginOutcome { claims, token })
    }

    /// End a session. Tokens are stateless, so this only records the event;
    /// the caller clears the cookie.
    pub fn logout(&self, claims: Option<&SessionClaims>) {
        if let Some(claims) = claims {
            tracing::info!(user_id = %claims.sub, "User logged out");
        }
    }

    /// Rename another account. Admin only.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for non-admins (store untouched), `Validation` for a
    /// short name, `NotFound`/`Failed` otherwise.
    pub fn admin_update_name(
        &self,
        claims: &SessionClaims,
        target: &UserId,
        form: UpdateNameForm,
    ) -> Result<PublicUser, ActionError> {
        require_admin(claims)?;
        let name = form.validated().map_err(ActionError::Validation)?;

        let mut user = match self.store.find_by_id(target) {
            Ok(Some(user)) => user,
            Ok(None) => return Err(ActionError::NotFound(UPDATE_FAILED)),
            Err(e) => {
                tracing::error!(user_id = %target, error = %e, "Rename lookup failed");
                return Err(ActionError::Failed(UPDATE_FAILED));
            }
        };

        user.name = name;
        self.store.update(&user).map_err(|e| match e {
            StoreError::NotFound(_) => ActionError::NotFound(UPDATE_FAILED),
            other => {
                tracing::error!(user_id = %target, error = %other, "Failed to update user");
                ActionError::Failed(UPDATE_FAILED)
            }
        })?;

        tracing::info!(admin_id = %claims.sub, user_id = %target, "User renamed");
        self.events.broadcast(UiEvent::users_changed());
        Ok(user.to_public())
    }

    /// Delete another account. Admin only.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for non-admins (store untouched), `SelfDeletion` when
    /// the target is the caller, `NotFound`/`Failed` otherwise.
    pub fn admin_delete_user(
        &self,
        claims: &SessionClaims,
        target: &UserId,
    ) -> Result<(), ActionError> {
        require_admin(claims)?;
        if &claims.sub == target {
            return Err(ActionError::SelfDeletion);
        }

        match self.store.delete(target) {
            Ok(true) => {}
            Ok(false) => return Err(ActionError::NotFound(DELETE_FAILED)),
            Err(e) => {
                tracing::error!(user_id = %target, error = %e, "Failed to delete user");
                return Err(ActionError::Failed(DELETE_FAILED));
            }
        }

        tracing::info!(admin_id = %claims.sub, user_id = %target, "User deleted");
        self.events.broadcast(UiEvent::users_changed());
        Ok(())
    }

    /// Every account except the caller's, ordered by name. Admin only.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for non-admins, `Failed` on storage failure.
    pub fn list_users(&self, claims: &SessionClaims) -> Result<Vec<PublicUser>, ActionError> {
        require_admin(claims)?;

        let users = self.store.list().map_err(|e| {
            tracing::error!(error = %e, "Failed to list users");
            ActionError::Failed("failed to load users")
        })?;

        let mut listing: Vec<PublicUser> = users
            .iter()
            .filter(|u| u.id != claims.sub)
            .map(User::to_public)
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        Ok(listing)
    }

    /// The caller's stored profile.
    ///
    /// # Errors
    ///
    /// `NotFound` if the account was deleted after the token was issued.
    pub fn profile(&self, claims: &SessionClaims) -> Result<PublicUser, ActionError> {
        match self.store.find_by_id(&claims.sub) {
            Ok(Some(user)) => Ok(user.to_public()),
            Ok(None) => Err(ActionError::NotFound("user not found")),
            Err(e) => {
                tracing::error!(user_id = %claims.sub, error = %e, "Profile lookup failed");
                Err(ActionError::Failed("failed to load profile"))
            }
        }
    }
}

impl std::fmt::Debug for Actions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actions")
            .field("auth", &self.auth)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

fn require_admin(claims: &SessionClaims) -> Result<(), ActionError> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(ActionError::Unauthorized)
    }
}
