//! Service layer: the business flows behind the HTTP handlers.

pub mod accounts;
pub mod orders;
pub mod payments;
pub mod sms;
