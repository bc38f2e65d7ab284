//! Postgres store. Aggregates are persisted as one JSONB document per row,
//! mirroring the document model, with the columns queries filter on
//! (status, stock, unique keys) lifted out and kept in sync.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::domain::category::Category;
use crate::domain::order::Order;
use crate::domain::product::Product;
use crate::domain::sms::{SmsCode, SmsPurpose};
use crate::domain::user::{Admin, User};
use crate::error::{ApiError, ApiResult};

use super::{CategoryStore, OrderFilter, OrderStore, Page, ProductFilter, ProductStore, SmsCodeStore, UserFilter, UserStore};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn doc<T: serde::Serialize>(value: &T) -> ApiResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.into()))
}

fn from_doc<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> ApiResult<T> {
    serde_json::from_value(value).map_err(|e| ApiError::Internal(e.into()))
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert(&self, product: Product) -> ApiResult<Product> {
        sqlx::query(
            "INSERT INTO products (id, category_id, name, is_active, stock, created_at, doc)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(product.id)
        .bind(product.category_id)
        .bind(&product.name)
        .bind(product.is_active)
        .bind(product.stock)
        .bind(product.created_at)
        .bind(doc(&product)?)
        .execute(&self.pool)
        .await?;
        Ok(product)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<Product>> {
        let row = sqlx::query("SELECT doc FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn update(&self, product: &Product) -> ApiResult<()> {
        // The live stock column is re-injected into the incoming document so
        // a stale edit cannot clobber a concurrent reservation.
        let result = sqlx::query(
            "UPDATE products
             SET category_id = $2, name = $3, is_active = $4,
                 doc = jsonb_set($5, '{stock}', to_jsonb(stock))
             WHERE id = $1",
        )
        .bind(product.id)
        .bind(product.category_id)
        .bind(&product.name)
        .bind(product.is_active)
        .bind(doc(product)?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("product"));
        }
        Ok(())
    }

    async fn list(&self, filter: ProductFilter, page: Page) -> ApiResult<(Vec<Product>, u64)> {
        let page = page.clamp();
        let mut query = QueryBuilder::<Postgres>::new("SELECT doc FROM products WHERE TRUE");
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products WHERE TRUE");
        for builder in [&mut query, &mut count] {
            if !filter.include_inactive {
                builder.push(" AND is_active = TRUE");
            }
            if let Some(category_id) = filter.category_id {
                builder.push(" AND category_id = ").push_bind(category_id);
            }
            if let Some(search) = &filter.search {
                builder
                    .push(" AND name ILIKE ")
                    .push_bind(format!("%{search}%"));
            }
        }
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.per_page as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = query.build().fetch_all(&self.pool).await?;
        let products = rows
            .into_iter()
            .map(|r| from_doc(r.get("doc")))
            .collect::<ApiResult<Vec<Product>>>()?;
        let total: i64 = count.build().fetch_one(&self.pool).await?.get(0);
        Ok((products, total as u64))
    }

    async fn count_in_category(&self, category_id: Uuid) -> ApiResult<u64> {
        let total: i64 = sqlx::query("SELECT COUNT(*) FROM products WHERE category_id = $1")
            .bind(category_id)
            .fetch_one(&self.pool)
            .await?
            .get(0);
        Ok(total as u64)
    }

    async fn try_reserve_stock(&self, id: Uuid, qty: u32) -> ApiResult<bool> {
        // Conditional decrement: the WHERE clause is what makes concurrent
        // reservations safe without a transaction around the whole order.
        let result = sqlx::query(
            "UPDATE products
             SET stock = stock - $2, doc = jsonb_set(doc, '{stock}', to_jsonb(stock - $2))
             WHERE id = $1 AND stock >= $2",
        )
        .bind(id)
        .bind(qty as i32)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists: bool = sqlx::query("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?
            .get(0);
        if !exists {
            return Err(ApiError::NotFound("product"));
        }
        Ok(false)
    }

    async fn restock(&self, id: Uuid, qty: u32) -> ApiResult<()> {
        sqlx::query(
            "UPDATE products
             SET stock = stock + $2, doc = jsonb_set(doc, '{stock}', to_jsonb(stock + $2))
             WHERE id = $1",
        )
        .bind(id)
        .bind(qty as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_stock(&self, id: Uuid, expected: i32, stock: i32) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE products
             SET stock = $3, doc = jsonb_set(doc, '{stock}', to_jsonb($3::int))
             WHERE id = $1 AND stock = $2",
        )
        .bind(id)
        .bind(expected)
        .bind(stock)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists: bool = sqlx::query("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?
            .get(0);
        if !exists {
            return Err(ApiError::NotFound("product"));
        }
        Ok(false)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: Order) -> ApiResult<Order> {
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, status, payment_status, version, created_at, doc)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(order.payment.status.as_str())
        .bind(order.version)
        .bind(order.created_at)
        .bind(doc(&order)?)
        .execute(&self.pool)
        .await?;
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<Order>> {
        let row = sqlx::query("SELECT doc FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn get_by_number(&self, order_number: &str) -> ApiResult<Option<Order>> {
        let row = sqlx::query("SELECT doc FROM orders WHERE order_number = $1")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn update(&self, order: &Order) -> ApiResult<Order> {
        let mut updated = order.clone();
        updated.version += 1;
        let result = sqlx::query(
            "UPDATE orders
             SET status = $2, payment_status = $3, version = $4, doc = $5
             WHERE id = $1 AND version = $6",
        )
        .bind(order.id)
        .bind(updated.status.as_str())
        .bind(updated.payment.status.as_str())
        .bind(updated.version)
        .bind(doc(&updated)?)
        .bind(order.version)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok(updated);
        }
        let exists: bool = sqlx::query("SELECT EXISTS(SELECT 1 FROM orders WHERE id = $1)")
            .bind(order.id)
            .fetch_one(&self.pool)
            .await?
            .get(0);
        if exists {
            Err(ApiError::Conflict("order was modified concurrently".into()))
        } else {
            Err(ApiError::NotFound("order"))
        }
    }

    async fn delete(&self, id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, filter: OrderFilter, page: Page) -> ApiResult<(Vec<Order>, u64)> {
        let page = page.clamp();
        let mut query = QueryBuilder::<Postgres>::new("SELECT doc FROM orders WHERE TRUE");
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders WHERE TRUE");
        for builder in [&mut query, &mut count] {
            if let Some(user_id) = filter.user_id {
                builder.push(" AND user_id = ").push_bind(user_id);
            }
            if let Some(status) = filter.status {
                builder.push(" AND status = ").push_bind(status.as_str());
            }
            if let Some(payment_status) = filter.payment_status {
                builder
                    .push(" AND payment_status = ")
                    .push_bind(payment_status.as_str());
            }
            if let Some(search) = &filter.search {
                builder
                    .push(" AND order_number ILIKE ")
                    .push_bind(format!("%{search}%"));
            }
        }
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.per_page as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = query.build().fetch_all(&self.pool).await?;
        let orders = rows
            .into_iter()
            .map(|r| from_doc(r.get("doc")))
            .collect::<ApiResult<Vec<Order>>>()?;
        let total: i64 = count.build().fetch_one(&self.pool).await?.get(0);
        Ok((orders, total as u64))
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert(&self, user: User) -> ApiResult<User> {
        sqlx::query(
            "INSERT INTO users (id, email, username, phone, created_at, doc)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.phone)
        .bind(user.created_at)
        .bind(doc(&user)?)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<User>> {
        let row = sqlx::query("SELECT doc FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn get_by_email(&self, email: &str) -> ApiResult<Option<User>> {
        let row = sqlx::query("SELECT doc FROM users WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn get_by_username(&self, username: &str) -> ApiResult<Option<User>> {
        let row = sqlx::query("SELECT doc FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn get_by_phone(&self, phone: &str) -> ApiResult<Option<User>> {
        let row = sqlx::query("SELECT doc FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn update(&self, user: &User) -> ApiResult<()> {
        let result = sqlx::query(
            "UPDATE users SET email = $2, username = $3, phone = $4, doc = $5 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.phone)
        .bind(doc(user)?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("user"));
        }
        Ok(())
    }

    async fn list(&self, filter: UserFilter, page: Page) -> ApiResult<(Vec<User>, u64)> {
        let page = page.clamp();
        let mut query = QueryBuilder::<Postgres>::new("SELECT doc FROM users WHERE TRUE");
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE TRUE");
        for builder in [&mut query, &mut count] {
            if let Some(is_active) = filter.is_active {
                builder
                    .push(" AND (doc->>'is_active')::boolean = ")
                    .push_bind(is_active);
            }
            if let Some(search) = &filter.search {
                let pattern = format!("%{search}%");
                builder
                    .push(" AND (username ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR email ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page.per_page as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = query.build().fetch_all(&self.pool).await?;
        let users = rows
            .into_iter()
            .map(|r| from_doc(r.get("doc")))
            .collect::<ApiResult<Vec<User>>>()?;
        let total: i64 = count.build().fetch_one(&self.pool).await?.get(0);
        Ok((users, total as u64))
    }

    async fn insert_admin(&self, admin: Admin) -> ApiResult<Admin> {
        sqlx::query(
            "INSERT INTO admins (id, email, created_at, doc) VALUES ($1, $2, $3, $4)",
        )
        .bind(admin.id)
        .bind(&admin.email)
        .bind(admin.created_at)
        .bind(doc(&admin)?)
        .execute(&self.pool)
        .await?;
        Ok(admin)
    }

    async fn get_admin(&self, id: Uuid) -> ApiResult<Option<Admin>> {
        let row = sqlx::query("SELECT doc FROM admins WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn get_admin_by_email(&self, email: &str) -> ApiResult<Option<Admin>> {
        let row = sqlx::query("SELECT doc FROM admins WHERE lower(email) = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn list_admins(&self) -> ApiResult<Vec<Admin>> {
        let rows = sqlx::query("SELECT doc FROM admins ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| from_doc(r.get("doc"))).collect()
    }
}

#[async_trait]
impl CategoryStore for PgStore {
    async fn insert(&self, category: Category) -> ApiResult<Category> {
        sqlx::query(
            "INSERT INTO categories (id, slug, parent_id, doc) VALUES ($1, $2, $3, $4)",
        )
        .bind(category.id)
        .bind(&category.slug)
        .bind(category.parent_id)
        .bind(doc(&category)?)
        .execute(&self.pool)
        .await?;
        Ok(category)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<Category>> {
        let row = sqlx::query("SELECT doc FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_doc(r.get("doc"))).transpose()
    }

    async fn update(&self, category: &Category) -> ApiResult<()> {
        let result = sqlx::query(
            "UPDATE categories SET slug = $2, parent_id = $3, doc = $4 WHERE id = $1",
        )
        .bind(category.id)
        .bind(&category.slug)
        .bind(category.parent_id)
        .bind(doc(category)?)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("category"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> ApiResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list(&self) -> ApiResult<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT doc FROM categories
             ORDER BY (doc->>'level')::int, (doc->>'sort_order')::int",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|r| from_doc(r.get("doc"))).collect()
    }

    async fn has_children(&self, id: Uuid) -> ApiResult<bool> {
        let exists: bool =
            sqlx::query("SELECT EXISTS(SELECT 1 FROM categories WHERE parent_id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?
                .get(0);
        Ok(exists)
    }
}

#[async_trait]
impl SmsCodeStore for PgStore {
    async fn insert(&self, code: SmsCode) -> ApiResult<SmsCode> {
        sqlx::query(
            "INSERT INTO sms_codes (id, phone, purpose, code, used, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(code.id)
        .bind(&code.phone)
        .bind(code.purpose.as_str())
        .bind(&code.code)
        .bind(code.used)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;
        Ok(code)
    }

    async fn last_issued_at(&self, phone: &str) -> ApiResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT created_at FROM sms_codes WHERE phone = $1
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get("created_at")))
    }

    async fn consume(
        &self,
        phone: &str,
        code: &str,
        purpose: SmsPurpose,
        now: DateTime<Utc>,
    ) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE sms_codes SET used = TRUE
             WHERE id = (
                 SELECT id FROM sms_codes
                 WHERE phone = $1 AND code = $2 AND purpose = $3
                   AND used = FALSE AND expires_at > $4
                 ORDER BY created_at DESC LIMIT 1
             )",
        )
        .bind(phone)
        .bind(code)
        .bind(purpose.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
