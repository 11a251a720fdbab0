//! Route authorization policy.
//!
//! A pure function of (path, claims). It never touches the credential store,
//! so a deleted account keeps passing the gate until its token expires.

use crate::config::RouteConfig;
use crate::types::SessionClaims;

/// Who is asking, as far as the gate can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No valid session token.
    Anonymous,
    /// Signed in with the `USER` role.
    User,
    /// Signed in with the `ADMIN` role.
    Admin,
}

impl SessionState {
    /// Derive the state from optional claims.
    #[must_use]
    pub const fn from_claims(claims: Option<&SessionClaims>) -> Self {
        match claims {
            None => Self::Anonymous,
            Some(c) if c.is_admin() => Self::Admin,
            Some(_) => Self::User,
        }
    }

    /// Whether any session is present.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        !matches!(self, Self::Anonymous)
    }
}

/// Outcome of the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Let the request through.
    Allow,
    /// Send the client elsewhere.
    Redirect(String),
}

impl Decision {
    /// Whether the request may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Decide whether `path` may be served to the holder of `claims`.
///
/// Rules, first match wins:
/// 1. admin area requires `ADMIN`, else redirect to login
/// 2. protected area requires any session, else redirect to login
/// 3. login/register while signed in redirects to the landing page
/// 4. anything else is allowed
#[must_use]
pub fn authorize_route(
    routes: &RouteConfig,
    path: &str,
    claims: Option<&SessionClaims>,
) -> Decision {
    let state = SessionState::from_claims(claims);

    if matches_prefix(path, &routes.admin_prefix) {
        return if state == SessionState::Admin {
            Decision::Allow
        } else {
            Decision::Redirect(routes.login_path.clone())
        };
    }

    if matches_prefix(path, &routes.protected_prefix) {
        return if state.is_authenticated() {
            Decision::Allow
        } else {
            Decision::Redirect(routes.login_path.clone())
        };
    }

    if state.is_authenticated()
        && (matches_prefix(path, &routes.login_path) || matches_prefix(path, &routes.register_path))
    {
        return Decision::Redirect(routes.landing_path.clone());
    }

    Decision::Allow
}

/// Segment-aware prefix match: `/admin` matches `/admin` and `/admin/x`,
/// never `/administrator`.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Email, Role, UserId};

    fn claims(role: Role) -> SessionClaims {
        SessionClaims {
            sub: UserId::new("u1"),
            role,
            name: "Ana Silva".to_string(),
            email: Email::new("ana@mail.com"),
            iat: 0,
            exp: i64::MAX,
        }
    }

    fn login() -> Decision {
        Decision::Redirect("/login".to_string())
    }

    #[test]
    fn test_admin_area() {
        let routes = RouteConfig::default();
        let user = claims(Role::User);
        let admin = claims(Role::Admin);

        assert_eq!(authorize_route(&routes, "/admin/users", None), login());
        assert_eq!(authorize_route(&routes, "/admin/users", Some(&user)), login());
        assert_eq!(
            authorize_route(&routes, "/admin/users", Some(&admin)),
            Decision::Allow
        );
        assert_eq!(authorize_route(&routes, "/admin", Some(&admin)), Decision::Allow);
    }

    #[test]
    fn test_protected_area() {
        let routes = RouteConfig::default();

        assert_eq!(authorize_route(&routes, "/dashboard", None), login());
        assert_eq!(authorize_route(&routes, "/dashboard/profile", None), login());
        for role in [Role::User, Role::Admin] {
            let c = claims(role);
            assert!(authorize_route(&routes, "/dashboard/profile", Some(&c)).is_allowed());
        }
    }

    #[test]
    fn test_entry_points_while_signed_in() {
        let routes = RouteConfig::default();
        let user = claims(Role::User);
        let landing = Decision::Redirect("/dashboard".to_string());

        assert_eq!(authorize_route(&routes, "/login", Some(&user)), landing);
        assert_eq!(authorize_route(&routes, "/register", Some(&user)), landing);
        assert_eq!(authorize_route(&routes, "/login", None), Decision::Allow);
        assert_eq!(authorize_route(&routes, "/register", None), Decision::Allow);
    }

    #[test]
    fn test_public_paths() {
        let routes = RouteConfig::default();
        assert_eq!(authorize_route(&routes, "/", None), Decision::Allow);
        assert_eq!(authorize_route(&routes, "/health", None), Decision::Allow);
    }

    #[test]
    fn test_segment_aware_matching() {
        let routes = RouteConfig::default();
        assert_eq!(authorize_route(&routes, "/administrator", None), Decision::Allow);
        assert_eq!(authorize_route(&routes, "/dashboards", None), Decision::Allow);
        assert_eq!(authorize_route(&routes, "/admin/", None), login());
    }

    #[test]
    fn test_session_state() {
        assert_eq!(SessionState::from_claims(None), SessionState::Anonymous);
        assert_eq!(
            SessionState::from_claims(Some(&claims(Role::User))),
            SessionState::User
        );
        assert_eq!(
            SessionState::from_claims(Some(&claims(Role::Admin))),
            SessionState::Admin
        );
    }

    #[test]
    fn test_custom_routes() {
        let routes = RouteConfig {
            admin_prefix: "/ops".to_string(),
            protected_prefix: "/app".to_string(),
            login_path: "/signin".to_string(),
            register_path: "/signup".to_string(),
            landing_path: "/app/home".to_string(),
        };
        let user = claims(Role::User);

        assert_eq!(
            authorize_route(&routes, "/ops/x", Some(&user)),
            Decision::Redirect("/signin".to_string())
        );
        assert_eq!(
            authorize_route(&routes, "/signup", Some(&user)),
            Decision::Redirect("/app/home".to_string())
        );
        assert_eq!(authorize_route(&routes, "/admin", None), Decision::Allow);
    }
}
