//! Account administration: admin listing and activation toggles, plus
//! profile reads and edits for the account owner.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::Paginated;
use crate::auth::{CurrentAdmin, CurrentPrincipal};
use crate::domain::sms::is_valid_phone;
use crate::domain::user::User;
use crate::error::{ApiError, ApiResult};
use crate::store::{Page, UserFilter};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn list(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Paginated<User>>> {
    let page = Page {
        page: params.page.unwrap_or(1),
        per_page: params.per_page.unwrap_or(20),
    }
    .clamp();
    let filter = UserFilter {
        search: params.search,
        is_active: params.is_active,
    };
    let (data, total) = state.users.list(filter, page).await?;
    Ok(Json(Paginated {
        data,
        total,
        page: page.page,
        per_page: page.per_page,
    }))
}

pub async fn get_one(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    if !principal.may_access(id) {
        return Err(ApiError::Forbidden("not your account".into()));
    }
    let user = state
        .users
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 20, message = "username must be 3-20 characters"))]
    pub username: Option<String>,
    pub phone: Option<String>,
    /// Admin-only; ignored when the caller owns the account.
    pub is_active: Option<bool>,
}

/// Profile update for the owner; admins may additionally flip `is_active`.
pub async fn update(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    request.validate()?;
    if !principal.may_access(id) {
        return Err(ApiError::Forbidden("not your account".into()));
    }
    let mut user = state
        .users
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    if let Some(username) = request.username {
        if username != user.username {
            if state.users.get_by_username(&username).await?.is_some() {
                return Err(ApiError::Conflict("username already taken".into()));
            }
            user.username = username;
        }
    }
    if let Some(phone) = request.phone {
        if !is_valid_phone(&phone) {
            return Err(ApiError::Validation("invalid phone number".into()));
        }
        user.phone = Some(phone);
    }
    if principal.is_admin() {
        if let Some(active) = request.is_active {
            user.is_active = active;
        }
    }
    user.updated_at = chrono::Utc::now();
    state.users.update(&user).await?;
    Ok(Json(user))
}

/// Admin toggle: a disabled account fails token checks and login.
pub async fn toggle_status(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    let mut user = state
        .users
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    user.is_active = !user.is_active;
    user.updated_at = chrono::Utc::now();
    state.users.update(&user).await?;
    Ok(Json(user))
}
