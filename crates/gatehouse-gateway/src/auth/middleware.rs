//! Route gate and claim extractors for axum.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;

use gatehouse_core::{AuthConfig, Decision, RouteConfig, SessionClaims, authorize_route};

use super::AuthError;
use super::jwt::JwtManager;

/// Shared authentication state.
pub struct AuthState {
    /// Auth configuration.
    pub config: AuthConfig,
    /// Route areas for the gate.
    pub routes: RouteConfig,
    /// JWT manager.
    pub jwt: JwtManager,
}

impl AuthState {
    /// Create a new auth state.
    #[must_use]
    pub const fn new(config: AuthConfig, routes: RouteConfig, jwt: JwtManager) -> Self {
        Self {
            config,
            routes,
            jwt,
        }
    }

    /// Initialize auth state, generating a JWT secret if none is configured.
    ///
    /// # Errors
    ///
    /// Returns error if the configured secret is not valid hex.
    pub fn initialize(mut config: AuthConfig, routes: RouteConfig) -> Result<Self, AuthError> {
        let jwt_secret = match &config.jwt_secret {
            Some(secret) => secret.clone(),
            None => {
                let secret = JwtManager::generate_hex_secret();
                config.jwt_secret = Some(secret.clone());
                tracing::warn!("No JWT secret configured; sessions will not survive a restart");
                secret
            }
        };

        let jwt = JwtManager::from_hex_secret(&jwt_secret, config.token_expiry())?;

        Ok(Self::new(config, routes, jwt))
    }

    /// Claims from the first valid token: the session cookie, then the
    /// `Authorization: Bearer` header.
    #[must_use]
    pub fn claims_from_headers(&self, headers: &HeaderMap) -> Option<SessionClaims> {
        parse_cookie(headers, &self.config.cookie_name)
            .into_iter()
            .chain(bearer_token(headers))
            .find_map(|token| match self.jwt.validate(&token) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring invalid session token");
                    None
                }
            })
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("routes", &self.routes)
            .field("jwt", &self.jwt)
            .finish_non_exhaustive()
    }
}

/// Find the session token: cookie first, then `Authorization: Bearer`.
///
/// Does not validate; the gate falls back to the header when the cookie
/// token is rejected.
#[must_use]
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    parse_cookie(headers, cookie_name).or_else(|| bearer_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(JwtManager::extract_from_header)
        .map(str::to_string)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.to_string())
}

/// `Set-Cookie` value carrying a fresh session token.
///
/// # Errors
///
/// Returns error if the token contains bytes not allowed in a header.
pub fn session_cookie(config: &AuthConfig, token: &str) -> Result<HeaderValue, AuthError> {
    let secure = if config.secure_cookie { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}{secure}",
        config.cookie_name,
        config.token_expiry().as_secs(),
    ))
    .map_err(|e| AuthError::TokenError(format!("Token not header-safe: {e}")))
}

/// `Set-Cookie` value that expires the session cookie.
///
/// # Errors
///
/// Returns error if the cookie name is not header-safe.
pub fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, AuthError> {
    let secure = if config.secure_cookie { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}=deleted; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT{secure}",
        config.cookie_name,
    ))
    .map_err(|e| AuthError::Config(format!("Cookie name not header-safe: {e}")))
}

/// Gate in front of every route.
///
/// Decodes the token (never touching the store), asks the route policy, and
/// either redirects or forwards the request with the claims attached as an
/// extension.
pub async fn route_gate(
    State(auth): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = auth.claims_from_headers(request.headers());
    let path = request.uri().path().to_string();

    match authorize_route(&auth.routes, &path, claims.as_ref()) {
        Decision::Allow => {
            if let Some(claims) = claims {
                request.extensions_mut().insert(claims);
            }
            next.run(request).await
        }
        Decision::Redirect(target) => {
            tracing::debug!(path = %path, target = %target, "Route gate redirect");
            Redirect::to(&target).into_response()
        }
    }
}

/// Extractor for authenticated requests.
///
/// Reads the claims the route gate attached; rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct RequireAuth {
    /// The authenticated user's claims.
    pub claims: SessionClaims,
}

impl RequireAuth {
    /// Check if user is admin.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.claims.is_admin()
    }
}

/// Error response for extractor rejections.
#[derive(Debug, Serialize)]
struct RejectionBody {
    success: bool,
    message: &'static str,
}

fn reject(status: StatusCode, message: &'static str) -> Response {
    (
        status,
        Json(RejectionBody {
            success: false,
            message,
        }),
    )
        .into_response()
}

impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionClaims>()
            .cloned()
            .map(|claims| Self { claims })
            .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "not authenticated"))
    }
}

/// Extractor for optional authentication.
#[derive(Debug, Clone)]
pub struct OptionalAuth(pub Option<RequireAuth>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(RequireAuth::from_request_parts(parts, state).await.ok()))
    }
}

/// Require admin role extractor.
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub RequireAuth);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = RequireAuth::from_request_parts(parts, state).await?;

        if !auth.is_admin() {
            return Err(reject(StatusCode::FORBIDDEN, "unauthorized"));
        }

        Ok(Self(auth))
    }
}
