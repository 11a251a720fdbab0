//! Gateway server.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Form, Json, Router,
    extract::{Path, State, rejection::FormRejection},
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::{
        IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use gatehouse_core::{
    AuthConfig, Config, Email, FieldErrors, LoginForm, RegisterForm, Role, RouteConfig,
    UpdateNameForm, UserId,
};

use crate::GatewayError;
use crate::actions::{ActionError, ActionResult, Actions};
use crate::auth::{
    Argon2Hasher, AuthState, CredentialHasher, CredentialStore, OptionalAuth, PublicUser,
    RequireAdmin, RequireAuth, SledCredentialStore, clear_session_cookie, route_gate,
    session_cookie, setup::seed_admin_from_env,
};
use crate::events::EventBroadcaster;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Port to listen on.
    pub port: u16,
    /// Bind address.
    pub bind_address: String,
    /// Enable CORS.
    pub cors: bool,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Data directory for the credential store.
    pub data_dir: PathBuf,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Route areas for the gate.
    pub routes: RouteConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GatewayConfig {
    /// Derive the server settings from a loaded config file.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.gateway.port,
            bind_address: config.gateway.bind_address(),
            cors: config.gateway.cors,
            timeout: Duration::from_secs(config.gateway.timeout_secs),
            data_dir: config.data_dir(),
            auth: config.auth.clone(),
            routes: config.routes.clone(),
        }
    }
}

/// Gateway server state shared across handlers.
#[derive(Clone, Debug)]
pub struct GatewayState {
    /// Action handlers.
    pub actions: Actions,
    /// Authentication state.
    pub auth: Arc<AuthState>,
    /// UI event broadcaster.
    pub events: EventBroadcaster,
}

impl GatewayState {
    /// Assemble state from its parts.
    #[must_use]
    pub fn new(
        auth: Arc<AuthState>,
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        let events = EventBroadcaster::new();
        let actions = Actions::new(store, hasher, auth.clone(), events.clone());
        Self {
            actions,
            auth,
            events,
        }
    }
}

/// Gateway server.
pub struct Gateway {
    config: GatewayConfig,
    state: GatewayState,
}

impl Gateway {
    /// Open the store, prepare auth, and seed an admin from the environment.
    ///
    /// # Errors
    ///
    /// Returns error if the data directory, store or auth cannot be set up.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| GatewayError::Config(format!("Failed to create data dir: {e}")))?;

        let store: Arc<dyn CredentialStore> = Arc::new(
            SledCredentialStore::open(&config.data_dir)
                .map_err(|e| GatewayError::Server(format!("Failed to open credential store: {e}")))?,
        );

        let hasher: Arc<dyn CredentialHasher> = Arc::new(
            Argon2Hasher::new(config.auth.hashing)
                .map_err(|e| GatewayError::Config(format!("Hasher init failed: {e}")))?,
        );

        let auth = Arc::new(
            AuthState::initialize(config.auth.clone().with_env_overrides(), config.routes.clone())
                .map_err(|e| GatewayError::Config(format!("Auth init failed: {e}")))?,
        );

        if let Err(e) = seed_admin_from_env(store.as_ref(), hasher.as_ref()) {
            tracing::warn!(error = %e, "Admin seed from env failed");
        }

        Ok(Self {
            state: GatewayState::new(auth, store, hasher),
            config,
        })
    }

    /// Shared state (for embedding or tests).
    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Run the gateway server until it fails.
    ///
    /// # Errors
    ///
    /// Returns error if the address is invalid or the listener fails.
    pub async fn run(&self) -> Result<(), GatewayError> {
        let app = router(self.state.clone())
            .layer(TimeoutLayer::new(self.config.timeout))
            .layer(TraceLayer::new_for_http());
        let app = if self.config.cors {
            app.layer(CorsLayer::permissive())
        } else {
            app
        };

        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid address: {e}")))?;

        tracing::info!("Gateway listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))
    }
}

/// Build the router with the route gate in front of every path.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(landing_handler))
        .route("/health", get(health_handler))
        .route("/login", get(login_form_handler).post(login_handler))
        .route("/register", get(register_form_handler).post(register_handler))
        .route("/logout", post(logout_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/dashboard/profile", get(profile_handler))
        .route("/admin/users", get(users_list_handler))
        .route("/admin/users/{id}/name", post(users_rename_handler))
        .route("/admin/users/{id}/delete", post(users_delete_handler))
        .route("/events", get(events_handler))
        .layer(middleware::from_fn_with_state(state.auth.clone(), route_gate))
        .with_state(state)
}

/// Run a synchronous action on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ActionError>
where
    F: FnOnce() -> Result<T, ActionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Action task failed");
        Err(ActionError::Internal)
    })
}

fn form_or_reject<T>(form: Result<Form<T>, FormRejection>) -> Result<T, ActionError> {
    form.map(|Form(inner)| inner).map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected form submission");
        ActionError::Validation(FieldErrors::form("invalid form submission"))
    })
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn landing_handler(OptionalAuth(auth): OptionalAuth) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "gatehouse",
        "version": env!("CARGO_PKG_VERSION"),
        "authenticated": auth.is_some(),
    }))
}

/// Describes a form the presentation layer should render.
#[derive(Debug, Serialize)]
struct FormDescriptor {
    form: &'static str,
    action: String,
    fields: &'static [&'static str],
}

async fn login_form_handler(State(state): State<GatewayState>) -> Json<FormDescriptor> {
    Json(FormDescriptor {
        form: "login",
        action: state.auth.routes.login_path.clone(),
        fields: &["email", "password"],
    })
}

async fn register_form_handler(State(state): State<GatewayState>) -> Json<FormDescriptor> {
    Json(FormDescriptor {
        form: "register",
        action: state.auth.routes.register_path.clone(),
        fields: &["name", "email", "password", "cep", "state", "city"],
    })
}

async fn register_handler(
    State(state): State<GatewayState>,
    form: Result<Form<RegisterForm>, FormRejection>,
) -> Result<Response, ActionError> {
    let form = form_or_reject(form)?;
    let actions = state.actions.clone();
    blocking(move || actions.register(form)).await?;

    Ok((StatusCode::CREATED, Json(ActionResult::ok("account created"))).into_response())
}

async fn login_handler(
    State(state): State<GatewayState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, ActionError> {
    let form = form_or_reject(form)?;
    let actions = state.actions.clone();
    let outcome = blocking(move || actions.login(form)).await?;

    let cookie = session_cookie(&state.auth.config, &outcome.token).map_err(|e| {
        tracing::error!(error = %e, "Failed to build session cookie");
        ActionError::Authentication
    })?;

    Ok((
        [(SET_COOKIE, cookie)],
        Redirect::to(&state.auth.routes.landing_path),
    )
        .into_response())
}

async fn logout_handler(
    State(state): State<GatewayState>,
    OptionalAuth(auth): OptionalAuth,
) -> Response {
    state.actions.logout(auth.as_ref().map(|a| &a.claims));
    let redirect = Redirect::to(&state.auth.routes.login_path);

    match clear_session_cookie(&state.auth.config) {
        Ok(cookie) => ([(SET_COOKIE, cookie)], redirect).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build logout cookie");
            redirect.into_response()
        }
    }
}

/// Session summary rendered on the landing page.
#[derive(Debug, Serialize)]
struct SessionSummary {
    id: UserId,
    name: String,
    email: Email,
    role: Role,
}

async fn dashboard_handler(RequireAuth { claims }: RequireAuth) -> Json<SessionSummary> {
    Json(SessionSummary {
        id: claims.sub,
        name: claims.name,
        email: claims.email,
        role: claims.role,
    })
}

async fn profile_handler(
    State(state): State<GatewayState>,
    RequireAuth { claims }: RequireAuth,
) -> Result<Json<PublicUser>, ActionError> {
    let actions = state.actions.clone();
    blocking(move || actions.profile(&claims)).await.map(Json)
}

/// Admin users listing.
#[derive(Debug, Serialize)]
struct UserListing {
    users: Vec<PublicUser>,
    total: usize,
}

async fn users_list_handler(
    State(state): State<GatewayState>,
    RequireAuth { claims }: RequireAuth,
) -> Result<Json<UserListing>, ActionError> {
    let actions = state.actions.clone();
    let users = blocking(move || actions.list_users(&claims)).await?;
    Ok(Json(UserListing {
        total: users.len(),
        users,
    }))
}

async fn users_rename_handler(
    State(state): State<GatewayState>,
    RequireAuth { claims }: RequireAuth,
    Path(id): Path<String>,
    form: Result<Form<UpdateNameForm>, FormRejection>,
) -> Result<Json<ActionResult>, ActionError> {
    let form = form_or_reject(form)?;
    let actions = state.actions.clone();
    let target = UserId::new(id);
    blocking(move || actions.admin_update_name(&claims, &target, form)).await?;
    Ok(Json(ActionResult::ok("user updated")))
}

async fn users_delete_handler(
    State(state): State<GatewayState>,
    RequireAuth { claims }: RequireAuth,
    Path(id): Path<String>,
) -> Result<Json<ActionResult>, ActionError> {
    let actions = state.actions.clone();
    let target = UserId::new(id);
    blocking(move || actions.admin_delete_user(&claims, &target)).await?;
    Ok(Json(ActionResult::ok("user deleted")))
}

async fn events_handler(
    State(state): State<GatewayState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|msg| async move {
        match msg {
            Ok(envelope) => {
                let data =
                    serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
                Some(Ok(Event::default()
                    .event(envelope.event.name())
                    .id(envelope.id)
                    .data(data)))
            }
            Err(e) => {
                tracing::debug!(error = %e, "Event subscriber lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
