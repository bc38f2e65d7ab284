//! Payment gateway bridge.
//!
//! The service never talks raw HTTP to the gateway from handlers; it goes
//! through [`PaymentGateway`], which the tests replace with a scripted
//! double. Requests and notifications carry an HMAC-SHA256 signature over
//! the gateway's canonical parameter string.

pub mod alipay;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;

use crate::error::ApiResult;

/// Trade settlement states reported by the gateway.
pub const TRADE_SUCCESS: &str = "TRADE_SUCCESS";
pub const TRADE_FINISHED: &str = "TRADE_FINISHED";
pub const TRADE_CLOSED: &str = "TRADE_CLOSED";

#[derive(Clone, Debug)]
pub struct PagePayRequest {
    pub out_trade_no: String,
    pub total_amount: Decimal,
    pub subject: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TradeQueryResult {
    pub out_trade_no: String,
    pub trade_no: Option<String>,
    pub trade_status: Option<String>,
    pub total_amount: Option<Decimal>,
}

#[derive(Clone, Debug)]
pub struct RefundRequest {
    pub out_trade_no: String,
    pub refund_amount: Decimal,
    pub refund_reason: String,
}

#[derive(Clone, Debug)]
pub struct RefundOutcome {
    /// Gateway reports `fund_change = "Y"` when money actually moved.
    pub fund_change: bool,
    pub detail: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Signed redirect URL to the gateway's hosted checkout.
    fn page_pay_url(&self, request: &PagePayRequest) -> ApiResult<String>;

    /// Verify the signature on an asynchronous notification or a
    /// synchronous return redirect. No mutation may happen before this.
    fn verify_notification(&self, params: &BTreeMap<String, String>) -> bool;

    /// Live settlement query; the return path uses this instead of
    /// trusting redirect parameters.
    async fn query_trade(&self, out_trade_no: &str) -> ApiResult<TradeQueryResult>;

    async fn refund(&self, request: &RefundRequest) -> ApiResult<RefundOutcome>;
}

/// Canonical signing string: non-empty parameters sorted by key, joined as
/// `k=v` with `&`, excluding `sign` and `sign_type`.
pub fn canonical_string(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, v)| k.as_str() != "sign" && k.as_str() != "sign_type" && !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn sign(params: &BTreeMap<String, String>, key: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(canonical_string(params).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify(params: &BTreeMap<String, String>, key: &str) -> bool {
    match params.get("sign") {
        Some(provided) => {
            let expected = sign(params, key);
            provided.len() == expected.len()
                && provided
                    .bytes()
                    .zip(expected.bytes())
                    .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                    == 0
        }
        None => false,
    }
}
