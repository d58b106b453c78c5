//! The JSON API driven in-process, sessions included.
//!
//! Sessions live in memory here; the database pool is lazy and never
//! touched by these routes.

use std::path::PathBuf;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_sessions::{MemoryStore as SessionStore, SessionManagerLayer};

use boxlane_core::{CodePolicy, CodePurpose};
use boxlane_integration_tests::{Harness, MAX_RECEIPT_BYTES, PASSWORD, png};
use boxlane_storefront::config::{ReceiptConfig, StorefrontConfig};
use boxlane_storefront::routes;
use boxlane_storefront::state::AppState;

const BOUNDARY: &str = "boxlane-test-boundary";

fn config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://boxlane@localhost/unused"),
        host: "127.0.0.1".parse().unwrap(),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        receipts: ReceiptConfig {
            dir: PathBuf::from("unused"),
            max_bytes: MAX_RECEIPT_BYTES,
        },
        codes: CodePolicy::default(),
        email: None,
        log_json: false,
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

fn app(h: &Harness) -> Router {
    let config = config();
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy("postgres://boxlane@localhost/unused")
        .unwrap();
    let state = AppState::new(config, pool, h.services.clone());

    routes::routes(MAX_RECEIPT_BYTES)
        .layer(SessionManagerLayer::new(SessionStore::default()).with_secure(false))
        .with_state(state)
}

/// Test client: one client IP and one cookie jar.
struct Client {
    app: Router,
    ip: &'static str,
    cookie: Option<String>,
}

impl Client {
    fn new(app: &Router, ip: &'static str) -> Self {
        Self {
            app: app.clone(),
            ip,
            cookie: None,
        }
    }

    async fn send(&mut self, builder: axum::http::request::Builder, body: Body) -> Response {
        let mut builder = builder.header("x-forwarded-for", self.ip);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_owned());
        }
        response
    }

    async fn post_json(&mut self, uri: &str, body: &Value) -> Response {
        let builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        self.send(builder, Body::from(body.to_string())).await
    }

    async fn get(&mut self, uri: &str) -> Response {
        self.send(Request::get(uri), Body::empty()).await
    }

    async fn post_multipart(&mut self, uri: &str, body: Vec<u8>) -> Response {
        let builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        self.send(builder, Body::from(body)).await
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Multipart body with a JSON part and an optional file part.
fn checkout_form(checkout: &Value, receipt: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"checkout\"\r\n\
         Content-Type: application/json\r\n\r\n{checkout}\r\n"
    )
    .into_bytes();
    if let Some((content_type, bytes)) = receipt {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"receipt\"; \
                 filename=\"receipt\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Register, verify, and log in over HTTP.
async fn logged_in(h: &Harness, app: &Router, email: &str, ip: &'static str) -> Client {
    let mut client = Client::new(app, ip);
    let credentials = json!({"email": email, "password": PASSWORD});

    let response = client.post_json("/api/auth/register", &credentials).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let code = h
        .outbox
        .last_code(email, CodePurpose::Registration)
        .unwrap();
    let response = client
        .post_json("/api/auth/verify", &json!({"email": email, "code": code}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.post_json("/api/auth/login", &credentials).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(client.cookie.is_some());
    client
}

#[tokio::test]
async fn test_health() {
    let h = Harness::default();
    let mut client = Client::new(&app(&h), "198.51.100.1");
    let response = client.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_checkout_over_http() {
    let h = Harness::default();
    let app = app(&h);
    let coffee = h.product("coffee-monthly", 2400).await.unwrap();
    let mut alice = logged_in(&h, &app, "alice@boxlane.test", "198.51.100.2").await;

    let request = json!({
        "items": [{"product_id": coffee.id, "quantity": 2}],
        "shipping": {
            "recipient": "Alice",
            "line1": "1 Main St",
            "city": "Leeds",
            "postal_code": "LS1 1AA",
            "country_code": "gb"
        },
        "payment_method": "bank_transfer"
    });

    // A bad receipt is reported but the order stands
    let form = checkout_form(&request, Some(("image/png", b"not really a png")));
    let response = alice.post_multipart("/api/checkout", form).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["order"]["status"], "placed");
    assert_eq!(body["order"]["payment_status"], "pending");
    assert_eq!(body["order"]["total"], "48.00");
    assert_eq!(body["receipt"], Value::Null);
    assert_eq!(body["receipt_error"]["error"], "invalid_file_type");
    let order_id = body["order"]["id"].as_i64().unwrap();

    // Upload again through the receipts endpoint
    let png = png();
    let form = checkout_form(&json!({}), Some(("image/png", &png)));
    let response = alice
        .post_multipart(&format!("/api/orders/{order_id}/receipts"), form)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = alice.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["payment_status"], "awaiting_verification");

    // Someone else's order reads as missing
    let mut bob = logged_in(&h, &app, "bob@boxlane.test", "198.51.100.3").await;
    let response = bob.get(&format!("/api/orders/{order_id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_auth_and_role_checks() {
    let h = Harness::default();
    let app = app(&h);

    let mut anonymous = Client::new(&app, "198.51.100.4");
    let response = anonymous.get("/api/orders").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "unauthorized");

    let mut carol = logged_in(&h, &app, "carol@boxlane.test", "198.51.100.5").await;
    let response = carol.get("/api/admin/payments/pending").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "forbidden");

    let response = carol.post_json("/api/auth/logout", &json!({})).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = carol.get("/api/orders").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_resend_cooldown_sets_retry_after() {
    let h = Harness::default();
    let app = app(&h);
    let mut client = Client::new(&app, "198.51.100.6");

    let credentials = json!({"email": "dan@boxlane.test", "password": PASSWORD});
    let response = client.post_json("/api/auth/register", &credentials).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    h.clock.advance(15);
    let response = client
        .post_json(
            "/api/auth/verify/resend",
            &json!({"email": "dan@boxlane.test"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "45");
    assert_eq!(json_body(response).await["error"], "cooldown");

    let response = client.post_json("/api/auth/login", &credentials).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "verification_required");
}
