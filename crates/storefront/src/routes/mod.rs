//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness check
//! GET  /health/ready                        - Readiness check (database)
//!
//! # Auth (rate limited)
//! POST /api/auth/register                   - Create account, send code
//! POST /api/auth/verify                     - Confirm email with code
//! POST /api/auth/verify/resend              - Send a fresh code
//! POST /api/auth/login                      - Start a session
//! POST /api/auth/logout                     - End the session
//! POST /api/auth/password-reset             - Send a reset code
//! POST /api/auth/password-reset/confirm     - Set a new password
//!
//! # Orders (requires auth)
//! POST /api/checkout                        - Place an order (multipart)
//! GET  /api/orders                          - Own orders, newest first
//! GET  /api/orders/{id}                     - Order detail
//! POST /api/orders/{id}/cancel              - Cancel
//! GET  /api/orders/{id}/receipts            - Receipt history
//! POST /api/orders/{id}/receipts            - Upload receipt (multipart)
//!
//! # Admin (requires admin role)
//! GET  /api/admin/payments/pending          - Receipts awaiting review
//! POST /api/admin/orders/{id}/status        - Status transition
//! POST /api/admin/orders/{id}/payment-review - Approve or reject receipt
//! ```

pub mod admin;
pub mod auth;
pub mod checkout;
pub mod health;
pub mod orders;
pub mod upload;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Room for multipart framing and the checkout JSON next to the image.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/verify", post(auth::verify))
        .route("/verify/resend", post(auth::resend_verification))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/password-reset", post(auth::request_password_reset))
        .route("/password-reset/confirm", post(auth::reset_password))
        .layer(auth_rate_limiter())
}

/// Create the customer order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list))
        .route("/{id}", get(orders::show))
        .route("/{id}/cancel", post(orders::cancel))
        .route(
            "/{id}/receipts",
            get(orders::receipts).post(orders::upload_receipt),
        )
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/payments/pending", get(admin::pending_payments))
        .route("/orders/{id}/status", post(admin::change_status))
        .route("/orders/{id}/payment-review", post(admin::review_payment))
}

/// Create all routes for the storefront.
pub fn routes(max_receipt_bytes: usize) -> Router<AppState> {
    let api = Router::new()
        .route("/checkout", post(checkout::checkout))
        .nest("/orders", order_routes())
        .nest("/admin", admin_routes())
        .layer(DefaultBodyLimit::max(
            max_receipt_bytes.saturating_add(FORM_OVERHEAD_BYTES),
        ))
        .layer(api_rate_limiter());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/auth", auth_routes())
        .nest("/api", api)
}
