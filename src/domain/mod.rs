//! Domain model: aggregates and the rules that guard them.

pub mod category;
pub mod order;
pub mod product;
pub mod sms;
pub mod user;
