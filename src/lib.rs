//! Storefront backend: catalog, orders, and an Alipay-style payment
//! bridge behind a JSON REST API.

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod service;
pub mod store;

use std::sync::Arc;
use std::time::Instant;

use crate::auth::TokenKeys;
use crate::gateway::PaymentGateway;
use crate::store::{CategoryStore, OrderStore, ProductStore, SmsCodeStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub products: Arc<dyn ProductStore>,
    pub orders: Arc<dyn OrderStore>,
    pub users: Arc<dyn UserStore>,
    pub categories: Arc<dyn CategoryStore>,
    pub sms_codes: Arc<dyn SmsCodeStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub tokens: TokenKeys,
    /// Echo one-time codes in responses (development only).
    pub echo_sms_codes: bool,
    pub started_at: Instant,
}

impl AppState {
    /// Wire every repository to a single backing store.
    pub fn new<S>(store: S, gateway: Arc<dyn PaymentGateway>, tokens: TokenKeys) -> Self
    where
        S: ProductStore
            + OrderStore
            + UserStore
            + CategoryStore
            + SmsCodeStore
            + Clone
            + 'static,
    {
        Self {
            products: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            categories: Arc::new(store.clone()),
            sms_codes: Arc::new(store),
            gateway,
            tokens,
            echo_sms_codes: false,
            started_at: Instant::now(),
        }
    }
}
