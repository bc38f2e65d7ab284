//! Category tree endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentAdmin;
use crate::domain::category::{slugify, Category};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Full tree, ordered by level then sort order so parents precede
/// children.
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    let mut categories = state.categories.list().await?;
    categories.sort_by(|a, b| {
        a.level
            .cmp(&b.level)
            .then(a.sort_order.cmp(&b.sort_order))
            .then(a.name.cmp(&b.name))
    });
    Ok(Json(categories))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Category>> {
    let category = state
        .categories
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("category"))?;
    Ok(Json(category))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 1000, message = "description is limited to 1000 characters"))]
    pub description: Option<String>,
    pub parent_id: Option<Uuid>,
    pub sort_order: Option<i32>,
}

pub async fn create(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Json(request): Json<CreateCategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    request.validate()?;
    let parent = match request.parent_id {
        Some(parent_id) => Some(
            state
                .categories
                .get(parent_id)
                .await?
                .ok_or(ApiError::NotFound("category"))?,
        ),
        None => None,
    };
    let mut category = Category::new(request.name, request.description, parent.as_ref());
    category.sort_order = request.sort_order.unwrap_or(0);
    let category = state.categories.insert(category).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 1000, message = "description is limited to 1000 characters"))]
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

pub async fn update(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCategoryRequest>,
) -> ApiResult<Json<Category>> {
    request.validate()?;
    let mut category = state
        .categories
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("category"))?;
    if let Some(name) = request.name {
        category.slug = slugify(&name);
        category.name = name;
    }
    if let Some(description) = request.description {
        category.description = Some(description);
    }
    if let Some(active) = request.is_active {
        category.is_active = active;
    }
    if let Some(sort_order) = request.sort_order {
        category.sort_order = sort_order;
    }
    category.updated_at = Utc::now();
    state.categories.update(&category).await?;
    Ok(Json(category))
}

/// Deletion requires an empty node: no child categories and no products
/// still filed under it.
pub async fn delete(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .categories
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("category"))?;
    if state.categories.has_children(id).await? {
        return Err(ApiError::BusinessRule(
            "category still has subcategories".into(),
        ));
    }
    if state.products.count_in_category(id).await? > 0 {
        return Err(ApiError::BusinessRule(
            "category still has products".into(),
        ));
    }
    state.categories.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
