#![allow(dead_code)]

//! Shared fixtures: an in-memory application, a scripted payment gateway,
//! and request helpers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use storefront::api::create_app;
use storefront::auth::{hash_password, PrincipalKind, TokenKeys};
use storefront::domain::product::Product;
use storefront::domain::user::{Admin, AdminRole, User};
use storefront::error::ApiResult;
use storefront::gateway::{
    sign, verify, PagePayRequest, PaymentGateway, RefundOutcome, RefundRequest, TradeQueryResult,
    TRADE_SUCCESS,
};
use storefront::store::memory::MemoryStore;
use storefront::AppState;

pub const GATEWAY_KEY: &str = "test-gateway-key";

/// Gateway double: signs and verifies with the shared test key, answers
/// queries and refunds from canned data.
pub struct MockGateway {
    pub refund_succeeds: bool,
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn page_pay_url(&self, request: &PagePayRequest) -> ApiResult<String> {
        Ok(format!(
            "https://gateway.test/pay?out_trade_no={}&total_amount={}",
            request.out_trade_no, request.total_amount
        ))
    }

    fn verify_notification(&self, params: &BTreeMap<String, String>) -> bool {
        verify(params, GATEWAY_KEY)
    }

    async fn query_trade(&self, out_trade_no: &str) -> ApiResult<TradeQueryResult> {
        Ok(TradeQueryResult {
            out_trade_no: out_trade_no.to_string(),
            trade_no: Some("MOCKTRADE001".into()),
            trade_status: Some(TRADE_SUCCESS.into()),
            total_amount: None,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> ApiResult<RefundOutcome> {
        Ok(RefundOutcome {
            fund_change: self.refund_succeeds,
            detail: json!({ "out_trade_no": request.out_trade_no }),
        })
    }
}

pub fn test_state() -> AppState {
    test_state_with(MockGateway {
        refund_succeeds: true,
    })
}

pub fn test_state_with(gateway: MockGateway) -> AppState {
    let tokens = TokenKeys::new("test-jwt-secret", Duration::from_secs(3600));
    let mut state = AppState::new(MemoryStore::new(), Arc::new(gateway), tokens);
    state.echo_sms_codes = true;
    state
}

pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    (create_app(state.clone()), state)
}

/// Insert a user directly and mint a token for it.
pub async fn seed_user(state: &AppState, username: &str) -> (User, String) {
    let user = state
        .users
        .insert(User::new(
            username.to_string(),
            format!("{username}@example.com"),
            hash_password("password123").unwrap(),
        ))
        .await
        .unwrap();
    let token = state.tokens.issue(user.id, PrincipalKind::User).unwrap();
    (user, token)
}

pub async fn seed_admin(state: &AppState, role: AdminRole) -> (Admin, String) {
    let admin = state
        .users
        .insert_admin(Admin::new(
            "ops".into(),
            "ops@example.com".into(),
            hash_password("admin-pass").unwrap(),
            role,
        ))
        .await
        .unwrap();
    let token = state.tokens.issue(admin.id, PrincipalKind::Admin).unwrap();
    (admin, token)
}

pub async fn seed_product(state: &AppState, name: &str, price: Decimal, stock: i32) -> Product {
    state
        .products
        .insert(Product::new(
            name.to_string(),
            format!("{name} description"),
            price,
            stock,
        ))
        .await
        .unwrap()
}

/// One-shot JSON request against a cloned router.
pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn response_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Build a correctly signed notification body the way the gateway would.
pub fn signed_notification(pairs: &[(&str, &str)]) -> String {
    let mut params: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let signature = sign(&params, GATEWAY_KEY);
    params.insert("sign".into(), signature);
    params.insert("sign_type".into(), "HMAC-SHA256".into());
    serde_urlencoded::to_string(&params).unwrap()
}

/// Post a form-encoded gateway notification and return the plain-text ack.
pub async fn post_notification(app: &Router, body: String) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payments/alipay/notify")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, response_text(response).await)
}

/// A minimal valid checkout payload for the given product lines.
pub fn order_payload(items: &[(Uuid, u32)]) -> Value {
    json!({
        "items": items
            .iter()
            .map(|(id, qty)| json!({ "product_id": id, "quantity": qty }))
            .collect::<Vec<_>>(),
        "shipping_address": {
            "first_name": "Ada",
            "last_name": "Lovelace",
            "phone": "13812345678",
            "street": "1 Analytical Way",
            "city": "London",
            "state": "LDN",
            "zip_code": "00001",
            "country": "UK"
        },
        "payment": { "method": "alipay" }
    })
}
