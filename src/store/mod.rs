//! Persistence traits. Two implementations: [`memory::MemoryStore`] for
//! tests and local development, [`postgres::PgStore`] for production.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::category::Category;
use crate::domain::order::{Order, OrderStatus, PaymentStatus};
use crate::domain::product::Product;
use crate::domain::sms::{SmsCode, SmsPurpose};
use crate::domain::user::{Admin, User};
use crate::error::ApiResult;

#[derive(Clone, Copy, Debug)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

impl Page {
    pub fn clamp(self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, 100),
        }
    }

    pub fn offset(self) -> u32 {
        (self.page - 1) * self.per_page
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProductFilter {
    pub category_id: Option<Uuid>,
    pub search: Option<String>,
    /// Admin listings include delisted products.
    pub include_inactive: bool,
}

#[derive(Clone, Debug, Default)]
pub struct UserFilter {
    /// Substring match on username or email.
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct OrderFilter {
    /// Restrict to one buyer; `None` means all (admin listing).
    pub user_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    /// Substring match on the order number.
    pub search: Option<String>,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert(&self, product: Product) -> ApiResult<Product>;
    async fn get(&self, id: Uuid) -> ApiResult<Option<Product>>;

    /// Document write that never touches `stock`: the stored quantity wins,
    /// so an edit racing a reservation cannot resurrect reserved units.
    /// Stock changes go through [`Self::try_reserve_stock`],
    /// [`Self::restock`] and [`Self::set_stock`].
    async fn update(&self, product: &Product) -> ApiResult<()>;

    async fn list(&self, filter: ProductFilter, page: Page) -> ApiResult<(Vec<Product>, u64)>;
    async fn count_in_category(&self, category_id: Uuid) -> ApiResult<u64>;

    /// Conditional decrement: applies only when `stock >= qty`, returning
    /// whether the reservation took effect. This is the compare-and-swap
    /// that keeps concurrent orders from driving stock negative.
    async fn try_reserve_stock(&self, id: Uuid, qty: u32) -> ApiResult<bool>;

    /// Unconditional increment, used for cancellations and for compensating
    /// a partially reserved order.
    async fn restock(&self, id: Uuid, qty: u32) -> ApiResult<()>;

    /// Absolute stock write, applied only when the stored quantity still
    /// equals `expected`. Returns whether the write took effect; `false`
    /// means a reservation slipped in and the caller should re-read.
    async fn set_stock(&self, id: Uuid, expected: i32, stock: i32) -> ApiResult<bool>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fails with `Conflict` when the order number is already taken; the
    /// caller regenerates and retries.
    async fn insert(&self, order: Order) -> ApiResult<Order>;
    async fn get(&self, id: Uuid) -> ApiResult<Option<Order>>;
    async fn get_by_number(&self, order_number: &str) -> ApiResult<Option<Order>>;

    /// Optimistic write: succeeds only when the stored version matches
    /// `order.version`, then bumps it. A lost race yields `Conflict`.
    async fn update(&self, order: &Order) -> ApiResult<Order>;

    async fn delete(&self, id: Uuid) -> ApiResult<bool>;
    async fn list(&self, filter: OrderFilter, page: Page) -> ApiResult<(Vec<Order>, u64)>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: User) -> ApiResult<User>;
    async fn get(&self, id: Uuid) -> ApiResult<Option<User>>;
    async fn get_by_email(&self, email: &str) -> ApiResult<Option<User>>;
    async fn get_by_username(&self, username: &str) -> ApiResult<Option<User>>;
    async fn get_by_phone(&self, phone: &str) -> ApiResult<Option<User>>;
    async fn update(&self, user: &User) -> ApiResult<()>;
    async fn list(&self, filter: UserFilter, page: Page) -> ApiResult<(Vec<User>, u64)>;

    async fn insert_admin(&self, admin: Admin) -> ApiResult<Admin>;
    async fn get_admin(&self, id: Uuid) -> ApiResult<Option<Admin>>;
    async fn get_admin_by_email(&self, email: &str) -> ApiResult<Option<Admin>>;
    async fn list_admins(&self) -> ApiResult<Vec<Admin>>;
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn insert(&self, category: Category) -> ApiResult<Category>;
    async fn get(&self, id: Uuid) -> ApiResult<Option<Category>>;
    async fn update(&self, category: &Category) -> ApiResult<()>;
    async fn delete(&self, id: Uuid) -> ApiResult<bool>;
    async fn list(&self) -> ApiResult<Vec<Category>>;
    async fn has_children(&self, id: Uuid) -> ApiResult<bool>;
}

#[async_trait]
pub trait SmsCodeStore: Send + Sync {
    async fn insert(&self, code: SmsCode) -> ApiResult<SmsCode>;

    /// Timestamp of the most recent issuance for a phone number, used for
    /// the per-phone rate limit.
    async fn last_issued_at(&self, phone: &str) -> ApiResult<Option<DateTime<Utc>>>;

    /// Consume the newest matching, unexpired, unused code: marks it used
    /// and reports whether one existed. A consumed code never matches
    /// again.
    async fn consume(
        &self,
        phone: &str,
        code: &str,
        purpose: SmsPurpose,
        now: DateTime<Utc>,
    ) -> ApiResult<bool>;
}
