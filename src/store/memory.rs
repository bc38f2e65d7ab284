//! In-memory store: `RwLock`-guarded maps with the same contract as the
//! Postgres implementation. Used by the integration tests and handy for
//! local development without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::category::Category;
use crate::domain::order::Order;
use crate::domain::product::Product;
use crate::domain::sms::{SmsCode, SmsPurpose};
use crate::domain::user::{Admin, User};
use crate::error::{ApiError, ApiResult};

use super::{CategoryStore, OrderFilter, OrderStore, Page, ProductFilter, ProductStore, SmsCodeStore, UserFilter, UserStore};

#[derive(Clone, Default)]
pub struct MemoryStore {
    products: Arc<RwLock<HashMap<Uuid, Product>>>,
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    users: Arc<RwLock<HashMap<Uuid, User>>>,
    admins: Arc<RwLock<HashMap<Uuid, Admin>>>,
    categories: Arc<RwLock<HashMap<Uuid, Category>>>,
    sms_codes: Arc<RwLock<Vec<SmsCode>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(mut items: Vec<T>, page: Page) -> (Vec<T>, u64) {
    let page = page.clamp();
    let total = items.len() as u64;
    let start = (page.offset() as usize).min(items.len());
    let end = (start + page.per_page as usize).min(items.len());
    (items.drain(start..end).collect(), total)
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn insert(&self, product: Product) -> ApiResult<Product> {
        self.products.write().await.insert(product.id, product.clone());
        Ok(product)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn update(&self, product: &Product) -> ApiResult<()> {
        let mut products = self.products.write().await;
        let stored = products
            .get_mut(&product.id)
            .ok_or(ApiError::NotFound("product"))?;
        let mut updated = product.clone();
        // The stored quantity wins; see the trait contract.
        updated.stock = stored.stock;
        *stored = updated;
        Ok(())
    }

    async fn list(&self, filter: ProductFilter, page: Page) -> ApiResult<(Vec<Product>, u64)> {
        let products = self.products.read().await;
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let mut matching: Vec<Product> = products
            .values()
            .filter(|p| filter.include_inactive || p.is_active)
            .filter(|p| filter.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| {
                needle
                    .as_deref()
                    .map_or(true, |n| p.name.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, page))
    }

    async fn count_in_category(&self, category_id: Uuid) -> ApiResult<u64> {
        let products = self.products.read().await;
        Ok(products
            .values()
            .filter(|p| p.category_id == Some(category_id))
            .count() as u64)
    }

    async fn try_reserve_stock(&self, id: Uuid, qty: u32) -> ApiResult<bool> {
        let mut products = self.products.write().await;
        let product = products.get_mut(&id).ok_or(ApiError::NotFound("product"))?;
        if product.stock < qty as i32 {
            return Ok(false);
        }
        product.stock -= qty as i32;
        product.updated_at = Utc::now();
        Ok(true)
    }

    async fn restock(&self, id: Uuid, qty: u32) -> ApiResult<()> {
        let mut products = self.products.write().await;
        // Restock on a product deleted in the meantime is a silent no-op.
        if let Some(product) = products.get_mut(&id) {
            product.stock += qty as i32;
            product.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_stock(&self, id: Uuid, expected: i32, stock: i32) -> ApiResult<bool> {
        let mut products = self.products.write().await;
        let product = products.get_mut(&id).ok_or(ApiError::NotFound("product"))?;
        if product.stock != expected {
            return Ok(false);
        }
        product.stock = stock;
        product.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: Order) -> ApiResult<Order> {
        let mut orders = self.orders.write().await;
        if orders.values().any(|o| o.order_number == order.order_number) {
            return Err(ApiError::Conflict("order number already exists".into()));
        }
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn get_by_number(&self, order_number: &str) -> ApiResult<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn update(&self, order: &Order) -> ApiResult<Order> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id).ok_or(ApiError::NotFound("order"))?;
        if stored.version != order.version {
            return Err(ApiError::Conflict(
                "order was modified concurrently".into(),
            ));
        }
        let mut updated = order.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> ApiResult<bool> {
        Ok(self.orders.write().await.remove(&id).is_some())
    }

    async fn list(&self, filter: OrderFilter, page: Page) -> ApiResult<(Vec<Order>, u64)> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|o| filter.user_id.map_or(true, |u| o.user_id == u))
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .filter(|o| {
                filter
                    .payment_status
                    .map_or(true, |s| o.payment.status == s)
            })
            .filter(|o| {
                filter
                    .search
                    .as_deref()
                    .map_or(true, |s| o.order_number.contains(s))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, page))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: User) -> ApiResult<User> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(ApiError::Conflict("email already registered".into()));
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(ApiError::Conflict("username already taken".into()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn get_by_phone(&self, phone: &str) -> ApiResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn update(&self, user: &User) -> ApiResult<()> {
        let mut users = self.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(ApiError::NotFound("user"));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn list(&self, filter: UserFilter, page: Page) -> ApiResult<(Vec<User>, u64)> {
        let users = self.users.read().await;
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let mut matching: Vec<User> = users
            .values()
            .filter(|u| filter.is_active.map_or(true, |a| u.is_active == a))
            .filter(|u| {
                needle.as_deref().map_or(true, |n| {
                    u.username.to_lowercase().contains(n) || u.email.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, page))
    }

    async fn insert_admin(&self, admin: Admin) -> ApiResult<Admin> {
        let mut admins = self.admins.write().await;
        if admins
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&admin.email))
        {
            return Err(ApiError::Conflict("email already registered".into()));
        }
        admins.insert(admin.id, admin.clone());
        Ok(admin)
    }

    async fn get_admin(&self, id: Uuid) -> ApiResult<Option<Admin>> {
        Ok(self.admins.read().await.get(&id).cloned())
    }

    async fn get_admin_by_email(&self, email: &str) -> ApiResult<Option<Admin>> {
        Ok(self
            .admins
            .read()
            .await
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_admins(&self) -> ApiResult<Vec<Admin>> {
        let mut admins: Vec<Admin> = self.admins.read().await.values().cloned().collect();
        admins.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(admins)
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn insert(&self, category: Category) -> ApiResult<Category> {
        let mut categories = self.categories.write().await;
        if categories.values().any(|c| c.slug == category.slug) {
            return Err(ApiError::Conflict("category slug already exists".into()));
        }
        categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<Category>> {
        Ok(self.categories.read().await.get(&id).cloned())
    }

    async fn update(&self, category: &Category) -> ApiResult<()> {
        let mut categories = self.categories.write().await;
        if !categories.contains_key(&category.id) {
            return Err(ApiError::NotFound("category"));
        }
        categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> ApiResult<bool> {
        Ok(self.categories.write().await.remove(&id).is_some())
    }

    async fn list(&self) -> ApiResult<Vec<Category>> {
        let mut categories: Vec<Category> =
            self.categories.read().await.values().cloned().collect();
        categories.sort_by(|a, b| (a.level, a.sort_order).cmp(&(b.level, b.sort_order)));
        Ok(categories)
    }

    async fn has_children(&self, id: Uuid) -> ApiResult<bool> {
        Ok(self
            .categories
            .read()
            .await
            .values()
            .any(|c| c.parent_id == Some(id)))
    }
}

#[async_trait]
impl SmsCodeStore for MemoryStore {
    async fn insert(&self, code: SmsCode) -> ApiResult<SmsCode> {
        self.sms_codes.write().await.push(code.clone());
        Ok(code)
    }

    async fn last_issued_at(&self, phone: &str) -> ApiResult<Option<DateTime<Utc>>> {
        Ok(self
            .sms_codes
            .read()
            .await
            .iter()
            .filter(|c| c.phone == phone)
            .map(|c| c.created_at)
            .max())
    }

    async fn consume(
        &self,
        phone: &str,
        code: &str,
        purpose: SmsPurpose,
        now: DateTime<Utc>,
    ) -> ApiResult<bool> {
        let mut codes = self.sms_codes.write().await;
        let found = codes
            .iter_mut()
            .filter(|c| c.phone == phone && c.code == code && c.purpose == purpose)
            .filter(|c| c.is_valid(now))
            .max_by_key(|c| c.created_at);
        match found {
            Some(c) => {
                c.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{generate_order_number, Address, LineItem, PaymentMethod};
    use rust_decimal_macros::dec;

    fn sample_order(user_id: Uuid) -> Order {
        Order::place(
            generate_order_number(),
            user_id,
            vec![LineItem {
                product_id: Uuid::new_v4(),
                name: "Widget".into(),
                quantity: 1,
                unit_price: dec!(10.00),
                total: dec!(10.00),
            }],
            PaymentMethod::Alipay,
            Address::default(),
            None,
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn stock_reservation_is_conditional() {
        let store = MemoryStore::new();
        let product = ProductStore::insert(
            &store,
            Product::new("Widget".into(), "d".into(), dec!(10.00), 2),
        )
        .await
        .unwrap();
        assert!(store.try_reserve_stock(product.id, 2).await.unwrap());
        assert!(!store.try_reserve_stock(product.id, 1).await.unwrap());
        store.restock(product.id, 2).await.unwrap();
        assert!(store.try_reserve_stock(product.id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn document_update_never_touches_stock() {
        let store = MemoryStore::new();
        let product = ProductStore::insert(
            &store,
            Product::new("Widget".into(), "d".into(), dec!(10.00), 5),
        )
        .await
        .unwrap();
        let stale = product.clone();
        assert!(store.try_reserve_stock(product.id, 2).await.unwrap());

        // A stale full-document write must not resurrect the reserved units.
        ProductStore::update(&store, &stale).await.unwrap();
        let stored = ProductStore::get(&store, product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 3);

        // Absolute writes go through the conditional setter.
        assert!(store.set_stock(product.id, 3, 10).await.unwrap());
        assert!(!store.set_stock(product.id, 3, 8).await.unwrap());
        let stored = ProductStore::get(&store, product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 10);
    }

    #[tokio::test]
    async fn order_update_detects_lost_race() {
        let store = MemoryStore::new();
        let order = OrderStore::insert(&store, sample_order(Uuid::new_v4()))
            .await
            .unwrap();
        let stale = order.clone();
        let fresh = OrderStore::update(&store, &order).await.unwrap();
        assert_eq!(fresh.version, order.version + 1);
        let err = OrderStore::update(&store, &stale).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_order_number_conflicts() {
        let store = MemoryStore::new();
        let a = sample_order(Uuid::new_v4());
        let mut b = sample_order(Uuid::new_v4());
        b.order_number = a.order_number.clone();
        OrderStore::insert(&store, a).await.unwrap();
        assert!(matches!(
            OrderStore::insert(&store, b).await.unwrap_err(),
            ApiError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn sms_codes_are_single_use() {
        let store = MemoryStore::new();
        let code = SmsCodeStore::insert(
            &store,
            SmsCode::issue("13812345678".into(), SmsPurpose::Login),
        )
        .await
        .unwrap();
        let now = Utc::now();
        assert!(store
            .consume("13812345678", &code.code, SmsPurpose::Login, now)
            .await
            .unwrap());
        assert!(!store
            .consume("13812345678", &code.code, SmsPurpose::Login, now)
            .await
            .unwrap());
    }
}
