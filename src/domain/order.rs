//! Order aggregate: line items, denormalized totals, payment sub-document
//! and the append-only status timeline.
//!
//! Status changes go through [`Order::transition`], which enforces the
//! allow-listed state machine. Totals are always recomputed server-side;
//! client-supplied amounts are never trusted.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Fixed tax rate applied to the subtotal.
pub const TAX_RATE: Decimal = dec!(0.10);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Allow-list of legal transitions. Anything not listed is rejected,
    /// including for admins.
    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Confirmed, Refunded)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Processing, Refunded)
                | (Shipped, Delivered)
                | (Shipped, Refunded)
                | (Delivered, Refunded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Paypal,
    Alipay,
    Wechat,
    BankTransfer,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refund_amount: Option<Decimal>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Payment {
    fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            paid_at: None,
            refund_amount: None,
            refunded_at: None,
        }
    }
}

/// Price and name are snapshots taken at order time; later product edits
/// never reach back into an existing order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Shipping {
    pub cost: Decimal,
    pub method: String,
    pub tracking_number: Option<String>,
}

impl Default for Shipping {
    fn default() -> Self {
        Self {
            cost: Decimal::ZERO,
            method: "standard".to_string(),
            tracking_number: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Discount {
    pub amount: Decimal,
    pub code: Option<String>,
}

impl Default for Discount {
    fn default() -> Self {
        Self {
            amount: Decimal::ZERO,
            code: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
    /// Principal that drove the change; `None` for gateway callbacks.
    pub actor: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Shipping,
    pub discount: Discount,
    pub total: Decimal,
    pub payment: Payment,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub note: Option<String>,
    pub timeline: Vec<TimelineEntry>,
    /// Optimistic-concurrency guard; the store rejects a write whose
    /// version does not match the stored one.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition { from: &'static str, to: &'static str },
    #[error("order has no items")]
    NoItems,
    #[error("order is already paid")]
    AlreadyPaid,
    #[error("order is not paid")]
    NotPaid,
}

impl Order {
    pub fn place(
        order_number: String,
        user_id: Uuid,
        items: Vec<LineItem>,
        method: PaymentMethod,
        shipping_address: Address,
        billing_address: Option<Address>,
        note: Option<String>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        let now = Utc::now();
        let billing_address = billing_address.unwrap_or_else(|| shipping_address.clone());
        let mut order = Self {
            id: Uuid::new_v4(),
            order_number,
            user_id,
            items,
            status: OrderStatus::Pending,
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            shipping: Shipping::default(),
            discount: Discount::default(),
            total: Decimal::ZERO,
            payment: Payment::new(method),
            shipping_address,
            billing_address,
            note,
            timeline: vec![TimelineEntry {
                status: OrderStatus::Pending,
                at: now,
                note: Some("order placed".to_string()),
                actor: Some(user_id),
            }],
            version: 0,
            created_at: now,
            updated_at: now,
        };
        order.recalculate();
        Ok(order)
    }

    /// Recompute the denormalized totals from the line items.
    /// total = subtotal + tax + shipping.cost - discount.amount
    pub fn recalculate(&mut self) {
        self.subtotal = self.items.iter().map(|i| i.total).sum();
        self.tax = (self.subtotal * TAX_RATE).round_dp(2);
        self.total = self.subtotal + self.tax + self.shipping.cost - self.discount.amount;
        self.touch();
    }

    pub fn transition(
        &mut self,
        to: OrderStatus,
        note: Option<String>,
        actor: Option<Uuid>,
    ) -> Result<(), OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::IllegalTransition {
                from: self.status.as_str(),
                to: to.as_str(),
            });
        }
        self.status = to;
        self.timeline.push(TimelineEntry {
            status: to,
            at: Utc::now(),
            note,
            actor,
        });
        self.touch();
        Ok(())
    }

    /// Settle the order after a verified gateway success notification.
    /// Idempotent: a re-delivered notification for an already paid order
    /// is a no-op.
    pub fn mark_paid(&mut self, trade_no: String) -> Result<bool, OrderError> {
        if self.payment.status == PaymentStatus::Paid {
            return Ok(false);
        }
        self.transition(
            OrderStatus::Confirmed,
            Some("payment received".to_string()),
            None,
        )?;
        self.payment.status = PaymentStatus::Paid;
        self.payment.transaction_id = Some(trade_no);
        self.payment.paid_at = Some(Utc::now());
        Ok(true)
    }

    /// Mirror of [`Order::mark_paid`] for the gateway's closed branch,
    /// guarded the same way.
    pub fn mark_payment_failed(&mut self) -> Result<bool, OrderError> {
        if matches!(
            self.payment.status,
            PaymentStatus::Paid | PaymentStatus::Failed
        ) || self.status.is_terminal()
        {
            return Ok(false);
        }
        self.transition(
            OrderStatus::Cancelled,
            Some("payment closed by gateway".to_string()),
            None,
        )?;
        self.payment.status = PaymentStatus::Failed;
        Ok(true)
    }

    pub fn mark_refunded(&mut self, amount: Decimal, actor: Uuid) -> Result<(), OrderError> {
        if self.payment.status != PaymentStatus::Paid {
            return Err(OrderError::NotPaid);
        }
        self.transition(
            OrderStatus::Refunded,
            Some(format!("refunded {amount}")),
            Some(actor),
        )?;
        self.payment.status = PaymentStatus::Refunded;
        self.payment.refund_amount = Some(amount);
        self.payment.refunded_at = Some(Utc::now());
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Human-readable merchant order number: ORD + date + 4-digit suffix.
/// Not unique by construction; callers retry on a store-level collision.
pub fn generate_order_number() -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("ORD{}{:04}", Utc::now().format("%Y%m%d"), suffix)
}
