//! Catalog endpoints. Reads are public; writes require an admin token.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::Paginated;
use crate::auth::{CurrentAdmin, CurrentUser};
use crate::domain::product::{Product, Review};
use crate::error::{ApiError, ApiResult};
use crate::store::{Page, ProductFilter};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

pub async fn list(
    State(state): State<AppState>,
    admin: Option<CurrentAdmin>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Paginated<Product>>> {
    let page = Page {
        page: params.page.unwrap_or(1),
        per_page: params.per_page.unwrap_or(20),
    }
    .clamp();
    let filter = ProductFilter {
        category_id: params.category,
        search: params.search,
        // Delisted products are only visible to the back office.
        include_inactive: params.include_inactive && admin.is_some(),
    };
    let (data, total) = state.products.list(filter, page).await?;
    Ok(Json(Paginated {
        data,
        total,
        page: page.page,
        per_page: page.per_page,
    }))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Product>> {
    let product = state
        .products
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    if !product.is_active {
        return Err(ApiError::NotFound("product"));
    }
    Ok(Json(product))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductPayload {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 5000, message = "description is limited to 5000 characters"))]
    pub description: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub sku: Option<String>,
    pub brand: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub category_id: Option<Uuid>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ProductPayload {
    fn check(&self) -> ApiResult<()> {
        self.validate()?;
        if self.price <= Decimal::ZERO {
            return Err(ApiError::Validation("price must be positive".into()));
        }
        if self.stock.unwrap_or(0) < 0 {
            return Err(ApiError::Validation("stock cannot be negative".into()));
        }
        Ok(())
    }
}

pub async fn create(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Json(payload): Json<ProductPayload>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    payload.check()?;
    if let Some(category_id) = payload.category_id {
        state
            .categories
            .get(category_id)
            .await?
            .ok_or(ApiError::NotFound("category"))?;
    }
    let mut product = Product::new(
        payload.name,
        payload.description,
        payload.price,
        payload.stock.unwrap_or(0),
    );
    product.original_price = payload.original_price;
    product.sku = payload.sku;
    product.brand = payload.brand;
    product.images = payload.images;
    product.category_id = payload.category_id;
    product.is_active = payload.is_active.unwrap_or(true);
    product.is_featured = payload.is_featured.unwrap_or(false);
    product.tags = payload.tags;
    let product = state.products.insert(product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductPayload>,
) -> ApiResult<Json<Product>> {
    payload.check()?;
    let mut product = state
        .products
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    if let Some(category_id) = payload.category_id {
        state
            .categories
            .get(category_id)
            .await?
            .ok_or(ApiError::NotFound("category"))?;
    }
    let current_stock = product.stock;
    product.name = payload.name;
    product.description = payload.description;
    product.price = payload.price;
    product.original_price = payload.original_price;
    product.sku = payload.sku;
    product.brand = payload.brand;
    product.images = payload.images;
    product.category_id = payload.category_id;
    if let Some(active) = payload.is_active {
        product.is_active = active;
    }
    if let Some(featured) = payload.is_featured {
        product.is_featured = featured;
    }
    product.tags = payload.tags;
    product.updated_at = Utc::now();
    state.products.update(&product).await?;
    // Stock is written separately and conditionally, so a reservation that
    // raced this edit surfaces as a conflict instead of a lost update.
    match payload.stock {
        Some(stock) if stock != current_stock => {
            if !state.products.set_stock(id, current_stock, stock).await? {
                return Err(ApiError::Conflict(
                    "stock was modified concurrently".into(),
                ));
            }
            product.stock = stock;
        }
        _ => product.stock = current_stock,
    }
    Ok(Json(product))
}

/// Soft delete: the product disappears from the catalog but order line
/// snapshots keep referring to it.
pub async fn delete(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let mut product = state
        .products
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    product.is_active = false;
    product.updated_at = Utc::now();
    state.products.update(&product).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Review>>> {
    let product = state
        .products
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    if !product.is_active {
        return Err(ApiError::NotFound("product"));
    }
    Ok(Json(product.reviews))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewPayload {
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(max = 1000, message = "comment is limited to 1000 characters"))]
    pub comment: Option<String>,
}

pub async fn add_review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewPayload>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    payload.validate()?;
    let mut product = state
        .products
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    if !product.is_active {
        return Err(ApiError::NotFound("product"));
    }
    if product.reviews.iter().any(|r| r.user_id == user.id) {
        return Err(ApiError::Conflict(
            "you have already reviewed this product".into(),
        ));
    }
    product.add_review(user.id, payload.rating, payload.comment);
    state.products.update(&product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}
