//! HTTP client for the Alipay-style gateway: hosted-checkout URL
//! construction, trade queries and refunds.

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;

use crate::config::AlipayConfig;
use crate::error::{ApiError, ApiResult};

use super::{
    sign, verify, PagePayRequest, PaymentGateway, RefundOutcome, RefundRequest, TradeQueryResult,
};

pub struct AlipayClient {
    config: AlipayConfig,
    http: reqwest::Client,
}

impl AlipayClient {
    pub fn new(config: AlipayConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(Self { config, http })
    }

    fn base_params(&self, method: &str, biz_content: serde_json::Value) -> BTreeMap<String, String> {
        let mut params = BTreeMap::from([
            ("app_id".to_string(), self.config.app_id.clone()),
            ("method".to_string(), method.to_string()),
            ("charset".to_string(), "utf-8".to_string()),
            ("sign_type".to_string(), "HMAC-SHA256".to_string()),
            (
                "timestamp".to_string(),
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
            ("version".to_string(), "1.0".to_string()),
            ("biz_content".to_string(), biz_content.to_string()),
        ]);
        let signature = sign(&params, &self.config.gateway_key);
        params.insert("sign".to_string(), signature);
        params
    }

    async fn exec(
        &self,
        method: &str,
        biz_content: serde_json::Value,
    ) -> ApiResult<serde_json::Value> {
        let params = self.base_params(method, biz_content);
        let response = self
            .http
            .post(&self.config.gateway_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        if !status.is_success() {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "gateway returned {status}: {body}"
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl PaymentGateway for AlipayClient {
    fn page_pay_url(&self, request: &PagePayRequest) -> ApiResult<String> {
        let biz_content = json!({
            "out_trade_no": request.out_trade_no,
            "total_amount": format!("{:.2}", request.total_amount),
            "subject": request.subject,
            "product_code": "FAST_INSTANT_TRADE_PAY",
            "timeout_express": "30m",
        });
        let mut params = self.base_params("alipay.trade.page.pay", biz_content);
        params.insert("return_url".to_string(), self.config.return_url.clone());
        params.insert("notify_url".to_string(), self.config.notify_url.clone());
        // return/notify URLs participate in the signature as well
        let signature = sign(&params, &self.config.gateway_key);
        params.insert("sign".to_string(), signature);
        let query =
            serde_urlencoded::to_string(&params).map_err(|e| ApiError::Internal(e.into()))?;
        Ok(format!("{}?{}", self.config.gateway_url, query))
    }

    fn verify_notification(&self, params: &BTreeMap<String, String>) -> bool {
        verify(params, &self.config.gateway_key)
    }

    async fn query_trade(&self, out_trade_no: &str) -> ApiResult<TradeQueryResult> {
        let body = self
            .exec("alipay.trade.query", json!({ "out_trade_no": out_trade_no }))
            .await?;
        let response = &body["alipay_trade_query_response"];
        Ok(TradeQueryResult {
            out_trade_no: out_trade_no.to_string(),
            trade_no: response["trade_no"].as_str().map(str::to_string),
            trade_status: response["trade_status"].as_str().map(str::to_string),
            total_amount: response["total_amount"]
                .as_str()
                .and_then(|s| s.parse().ok()),
        })
    }

    async fn refund(&self, request: &RefundRequest) -> ApiResult<RefundOutcome> {
        let body = self
            .exec(
                "alipay.trade.refund",
                json!({
                    "out_trade_no": request.out_trade_no,
                    "refund_amount": format!("{:.2}", request.refund_amount),
                    "refund_reason": request.refund_reason,
                }),
            )
            .await?;
        let response = &body["alipay_trade_refund_response"];
        Ok(RefundOutcome {
            fund_change: response["fund_change"].as_str() == Some("Y"),
            detail: response.clone(),
        })
    }
}
