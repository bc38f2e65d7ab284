//! One-time codes for phone login: short-lived, single-use, bound to a
//! phone number and purpose.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Codes expire five minutes after issuance.
pub const CODE_TTL_MINUTES: i64 = 5;
/// At most one issuance per phone number inside this window.
pub const RATE_LIMIT_SECONDS: i64 = 60;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmsPurpose {
    #[default]
    Login,
    Register,
    ResetPassword,
    BindPhone,
}

impl SmsPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            SmsPurpose::Login => "login",
            SmsPurpose::Register => "register",
            SmsPurpose::ResetPassword => "reset-password",
            SmsPurpose::BindPhone => "bind-phone",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmsCode {
    pub id: Uuid,
    pub phone: String,
    pub code: String,
    pub purpose: SmsPurpose,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SmsCode {
    pub fn issue(phone: String, purpose: SmsPurpose) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone,
            code: generate_code(6),
            purpose,
            used: false,
            expires_at: now + Duration::minutes(CODE_TTL_MINUTES),
            created_at: now,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }
}

pub fn generate_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| char::from(b'0' + rng.gen_range(0..10))).collect()
}

/// Mainland mobile number format.
pub fn is_valid_phone(phone: &str) -> bool {
    let bytes = phone.as_bytes();
    bytes.len() == 11
        && bytes[0] == b'1'
        && (b'3'..=b'9').contains(&bytes[1])
        && bytes.iter().all(|b| b.is_ascii_digit())
}
