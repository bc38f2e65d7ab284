//! HTTP surface: route table, shared response envelopes, and the health
//! probe. Handlers live in the per-resource submodules.

pub mod auth;
pub mod categories;
pub mod orders;
pub mod payments;
pub mod products;
pub mod users;

use axum::{
    extract::State,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

/// Standard list envelope.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/sms/send", post(auth::send_sms_code))
        .route("/api/auth/sms/login", post(auth::sms_login))
        .route("/api/admin/login", post(auth::admin_login))
        .route("/api/admin/me", get(auth::admin_me))
        .route("/api/admin/register", post(auth::admin_register))
        .route("/api/admins", get(auth::list_admins))
        .route("/api/users", get(users::list))
        .route("/api/users/:id", get(users::get_one).put(users::update))
        .route("/api/users/:id/status", patch(users::toggle_status))
        .route(
            "/api/products",
            get(products::list).post(products::create),
        )
        .route(
            "/api/products/:id",
            get(products::get_one)
                .put(products::update)
                .delete(products::delete),
        )
        .route(
            "/api/products/:id/reviews",
            get(products::list_reviews).post(products::add_review),
        )
        .route(
            "/api/categories",
            get(categories::list).post(categories::create),
        )
        .route(
            "/api/categories/:id",
            get(categories::get_one)
                .put(categories::update)
                .delete(categories::delete),
        )
        .route("/api/orders", get(orders::list_mine).post(orders::create))
        .route("/api/orders/admin", get(orders::list_all))
        .route(
            "/api/orders/:id",
            get(orders::get_one).delete(orders::delete),
        )
        .route("/api/orders/:id/status", patch(orders::update_status))
        .route("/api/orders/:id/cancel", patch(orders::cancel))
        .route("/api/payments/alipay", post(payments::create))
        .route("/api/payments/alipay/notify", post(payments::notify))
        .route("/api/payments/alipay/return", get(payments::return_page))
        .route("/api/payments/alipay/refund", post(payments::refund))
        .route(
            "/api/payments/alipay/:order_number",
            get(payments::status),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "storefront",
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
