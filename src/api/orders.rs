//! Order endpoints: checkout for shoppers, fulfillment for admins.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::Paginated;
use crate::auth::{CurrentAdmin, CurrentPrincipal, CurrentUser};
use crate::domain::order::{Order, OrderStatus, PaymentStatus};
use crate::error::{ApiError, ApiResult};
use crate::service::orders::{self, CreateOrderRequest, StatusUpdateRequest};
use crate::store::{OrderFilter, Page};
use crate::AppState;

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = orders::place_order(&state, user.id, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub search: Option<String>,
    pub user_id: Option<Uuid>,
}

impl ListParams {
    fn page(&self) -> Page {
        Page {
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(20),
        }
        .clamp()
    }
}

pub async fn list_mine(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Paginated<Order>>> {
    let page = params.page();
    let filter = OrderFilter {
        user_id: Some(user.id),
        status: params.status,
        payment_status: params.payment_status,
        search: params.search,
    };
    let (data, total) = state.orders.list(filter, page).await?;
    Ok(Json(Paginated {
        data,
        total,
        page: page.page,
        per_page: page.per_page,
    }))
}

pub async fn list_all(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Paginated<Order>>> {
    let page = params.page();
    let filter = OrderFilter {
        user_id: params.user_id,
        status: params.status,
        payment_status: params.payment_status,
        search: params.search,
    };
    let (data, total) = state.orders.list(filter, page).await?;
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
) -> ApiResult<Json<Order>> {
    let order = state
        .orders
        .get(id)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    if !principal.may_access(order.user_id) {
        return Err(ApiError::Forbidden("not your order".into()));
    }
    Ok(Json(order))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    let order = orders::cancel_order(&state, &principal, id).await?;
    Ok(Json(order))
}

pub async fn update_status(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(id): Path<Uuid>,
    Json(request): Json<StatusUpdateRequest>,
) -> ApiResult<Json<Order>> {
    let order = orders::update_status(&state, admin.id, id, request).await?;
    Ok(Json(order))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentAdmin(_): CurrentAdmin,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    orders::delete_order(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
