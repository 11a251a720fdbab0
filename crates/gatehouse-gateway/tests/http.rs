//! End-to-end tests driving the router in-process.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
    response::Response,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tower::ServiceExt;

use gatehouse_core::config::HashingConfig;
use gatehouse_core::{AuthConfig, Role, RouteConfig};
use gatehouse_gateway::auth::setup::provision_user;
use gatehouse_gateway::{
    Argon2Hasher, AuthState, CredentialStore, GatewayState, JwtManager, SledCredentialStore, router,
};

struct Harness {
    app: Router,
    store: Arc<SledCredentialStore>,
    hasher: Arc<Argon2Hasher>,
}

fn harness() -> Harness {
    let store = Arc::new(SledCredentialStore::temporary().unwrap());
    let hasher = Arc::new(
        Argon2Hasher::new(HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap(),
    );
    let config = AuthConfig::builder()
        .jwt_secret(JwtManager::generate_hex_secret())
        .build();
    let auth = Arc::new(AuthState::initialize(config, RouteConfig::default()).unwrap());
    let state = GatewayState::new(auth, store.clone(), hasher.clone());

    Harness {
        app: router(state),
        store,
        hasher,
    }
}

impl Harness {
    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn register(&self, name: &str, email: &str, password: &str) -> Response {
        let body = encode(&[("name", name), ("email", email), ("password", password)]);
        self.send(form("/register", &body, None)).await
    }

    async fn login(&self, email: &str, password: &str) -> Response {
        let body = encode(&[("email", email), ("password", password)]);
        self.send(form("/login", &body, None)).await
    }

    /// Log in and return the `name=value` cookie pair.
    async fn session(&self, email: &str, password: &str) -> String {
        let response = self.login(email, password).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        session_pair(&response)
    }

    fn admin(&self) {
        provision_user(
            self.store.as_ref(),
            self.hasher.as_ref(),
            "Root Admin",
            "root@mail.com",
            "Secret123",
            Role::Admin,
        )
        .unwrap();
    }
}

fn encode(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={}", v.replace('@', "%40").replace(' ', "+")))
        .collect::<Vec<_>>()
        .join("&")
}

fn form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::get(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn session_pair(response: &Response) -> String {
    let header = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    header.split(';').next().unwrap().to_string()
}

fn location(response: &Response) -> &str {
    response.headers().get(LOCATION).unwrap().to_str().unwrap()
}

async fn json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let h = harness();
    let response = h.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn register_login_and_dashboard() {
    let h = harness();

    let response = h.register("Ana Silva", "Ana@Mail.com", "Abcdef12").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json(response).await["success"], true);

    let response = h.login("ana@mail.com", "Abcdef12").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
    let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("gatehouse_session="));
    assert!(set_cookie.contains("HttpOnly"));

    let cookie = session_pair(&response);
    let response = h.send(get("/dashboard", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["email"], "ana@mail.com");
    assert_eq!(body["role"], "USER");
    assert_eq!(body["name"], "Ana Silva");
}

#[tokio::test]
async fn registration_errors_are_field_attributed() {
    let h = harness();

    let response = h.register("An", "ana@mail.com", "abc").await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["errors"]["name"][0], "name must be at least 3 characters");
    assert_eq!(body["errors"]["password"].as_array().unwrap().len(), 3);

    h.register("Ana Silva", "ana@mail.com", "Abcdef12").await;
    let response = h.register("Ana Again", "ANA@mail.com", "Abcdef12").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json(response).await["errors"]["_form"][0], "email already in use");
}

#[tokio::test]
async fn unknown_form_fields_rejected() {
    let h = harness();
    let body = "name=Ana+Silva&email=ana%40mail.com&password=Abcdef12&role=ADMIN";
    let response = h.send(form("/register", body, None)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(h.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn login_failures_look_identical() {
    let h = harness();
    h.register("Ana Silva", "ana@mail.com", "Abcdef12").await;

    let wrong = h.login("ana@mail.com", "Wrong1234").await;
    let unknown = h.login("nobody@mail.com", "Abcdef12").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert!(wrong.headers().get(SET_COOKIE).is_none());

    let wrong = to_bytes(wrong.into_body(), usize::MAX).await.unwrap();
    let unknown = to_bytes(unknown.into_body(), usize::MAX).await.unwrap();
    assert_eq!(wrong, unknown);
    assert_eq!(
        serde_json::from_slice::<Value>(&wrong).unwrap()["errors"]["_form"][0],
        "invalid credentials"
    );
}

#[tokio::test]
async fn anonymous_requests_redirect_to_login() {
    let h = harness();

    for path in ["/dashboard", "/dashboard/profile", "/admin/users"] {
        let response = h.send(get(path, None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&response), "/login");
    }

    let response = h.send(get("/login", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["fields"][0], "email");
}

#[tokio::test]
async fn entry_points_redirect_when_signed_in() {
    let h = harness();
    h.register("Ana Silva", "ana@mail.com", "Abcdef12").await;
    let cookie = h.session("ana@mail.com", "Abcdef12").await;

    for path in ["/login", "/register"] {
        let response = h.send(get(path, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/dashboard");
    }
}

#[tokio::test]
async fn admin_area_requires_admin_role() {
    let h = harness();
    h.admin();
    for (name, email) in [("Carla Dias", "carla@mail.com"), ("Ana Silva", "ana@mail.com")] {
        h.register(name, email, "Abcdef12").await;
    }

    let user = h.session("ana@mail.com", "Abcdef12").await;
    let response = h.send(get("/admin/users", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let admin = h.session("root@mail.com", "Secret123").await;
    let response = h.send(get("/admin/users", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["users"][0]["name"], "Ana Silva");
    assert_eq!(body["users"][1]["name"], "Carla Dias");
    assert!(body["users"][0].get("passwordHash").is_none());
}

#[tokio::test]
async fn admin_rename_and_delete() {
    let h = harness();
    h.admin();
    h.register("Ana Silva", "ana@mail.com", "Abcdef12").await;
    let ana = h
        .store
        .find_by_email(&gatehouse_core::Email::new("ana@mail.com"))
        .unwrap()
        .unwrap();

    let user = h.session("ana@mail.com", "Abcdef12").await;
    let rename = format!("/admin/users/{}/name", ana.id);
    let response = h.send(form(&rename, "name=Hacked", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(h.store.find_by_id(&ana.id).unwrap().unwrap().name, "Ana Silva");

    let admin = h.session("root@mail.com", "Secret123").await;
    let response = h.send(form(&rename, "name=Al", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = h.send(form(&rename, "name=Ana+Souza", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["message"], "user updated");
    assert_eq!(h.store.find_by_id(&ana.id).unwrap().unwrap().name, "Ana Souza");

    let delete = format!("/admin/users/{}/delete", ana.id);
    let response = h.send(form(&delete, "", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(h.store.find_by_id(&ana.id).unwrap().is_none());

    let response = h.send(form(&delete, "", Some(&admin))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["message"], "failed to delete user");
}

#[tokio::test]
async fn profile_via_bearer_token() {
    let h = harness();
    let body = "name=Ana+Silva&email=ana%40mail.com&password=Abcdef12&cep=50000-000&state=PE&city=Recife&cep=";
    // duplicate keys are a malformed submission
    let response = h.send(form("/register", body, None)).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = "name=Ana+Silva&email=ana%40mail.com&password=Abcdef12&cep=&state=PE&city=Recife";
    let response = h.send(form("/register", body, None)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = h.session("ana@mail.com", "Abcdef12").await;
    let token = cookie.split_once('=').unwrap().1.to_string();

    let request = Request::get("/dashboard/profile")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = h.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = json(response).await;
    assert_eq!(profile["city"], "Recife");
    assert_eq!(profile["state"], "PE");
    assert!(profile.get("cep").is_none());
}

#[tokio::test]
async fn stale_cookie_does_not_hide_bearer_token() {
    let h = harness();
    h.register("Ana Silva", "ana@mail.com", "Abcdef12").await;
    let cookie = h.session("ana@mail.com", "Abcdef12").await;
    let token = cookie.split_once('=').unwrap().1.to_string();

    let request = Request::get("/dashboard")
        .header(COOKIE, "gatehouse_session=expired.or.garbage")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let response = h.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["email"], "ana@mail.com");
}

#[tokio::test]
async fn logout_clears_cookie() {
    let h = harness();
    h.register("Ana Silva", "ana@mail.com", "Abcdef12").await;
    let cookie = h.session("ana@mail.com", "Abcdef12").await;

    let response = h.send(form("/logout", "", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let cleared = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let response = h.send(form("/logout", "", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn events_require_admin() {
    let h = harness();
    h.register("Ana Silva", "ana@mail.com", "Abcdef12").await;
    let user = h.session("ana@mail.com", "Abcdef12").await;

    let response = h.send(get("/events", Some(&user))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = h.send(get("/events", None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    h.admin();
    let admin = h.session("root@mail.com", "Secret123").await;
    let response = tokio::time::timeout(
        Duration::from_secs(5),
        h.send(get("/events", Some(&admin))),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
}
