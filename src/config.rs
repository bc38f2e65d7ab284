//! Process configuration.
//!
//! Every secret is mandatory: a missing variable aborts startup instead of
//! silently falling back to an insecure default.

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub alipay: AlipayConfig,
    /// Echo one-time codes back in API responses (development only).
    pub echo_sms_codes: bool,
}

#[derive(Clone, Debug)]
pub struct AlipayConfig {
    pub app_id: String,
    /// Shared key used to sign requests and verify gateway notifications.
    pub gateway_key: String,
    pub gateway_url: String,
    pub return_url: String,
    pub notify_url: String,
    pub timeout: Duration,
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("PORT must be a number")?;
        let jwt_ttl_secs: u64 = std::env::var("JWT_TTL_SECS")
            .unwrap_or_else(|_| (7 * 24 * 3600).to_string())
            .parse()
            .context("JWT_TTL_SECS must be a number")?;

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            port,
            jwt_secret: required("JWT_SECRET")?,
            jwt_ttl: Duration::from_secs(jwt_ttl_secs),
            alipay: AlipayConfig {
                app_id: required("ALIPAY_APP_ID")?,
                gateway_key: required("ALIPAY_GATEWAY_KEY")?,
                gateway_url: required("ALIPAY_GATEWAY_URL")?,
                return_url: required("ALIPAY_RETURN_URL")?,
                notify_url: required("ALIPAY_NOTIFY_URL")?,
                timeout: Duration::from_secs(5),
            },
            echo_sms_codes: std::env::var("ECHO_SMS_CODES")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}
