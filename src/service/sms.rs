//! SMS delivery. No provider is wired up; codes are logged so local and
//! staging environments can complete the login flow.

use tracing::info;

use crate::domain::sms::SmsPurpose;

pub fn deliver(phone: &str, code: &str, purpose: SmsPurpose) {
    info!(phone, code, purpose = purpose.as_str(), "sms code issued");
}
