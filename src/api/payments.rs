//! Payment endpoints. The notify route speaks the gateway's plain-text
//! acknowledgement protocol; everything else is JSON.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    Form, Json,
};
use serde_json::Value;

use crate::auth::{CurrentAdmin, CurrentPrincipal, CurrentUser};
use crate::domain::order::Order;
use crate::error::ApiResult;
use crate::service::payments::{
    self, CreatePaymentRequest, CreatePaymentResponse, RefundApiRequest, ReturnReport,
};
use crate::AppState;

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreatePaymentRequest>,
) -> ApiResult<Json<CreatePaymentResponse>> {
    Ok(Json(payments::create_payment(&state, user.id, request).await?))
}

/// Server-to-server notification. The gateway retries until it reads the
/// literal body "success", so the reply is plain text, never JSON.
pub async fn notify(
    State(state): State<AppState>,
    Form(params): Form<BTreeMap<String, String>>,
) -> &'static str {
    payments::handle_notification(&state, params).await.as_str()
}

/// Browser return redirect after hosted checkout.
pub async fn return_page(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> ApiResult<Json<ReturnReport>> {
    Ok(Json(payments::handle_return(&state, params).await?))
}

pub async fn status(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(order_number): Path<String>,
) -> ApiResult<Json<Value>> {
    Ok(Json(
        payments::query_status(&state, &principal, &order_number).await?,
    ))
}

pub async fn refund(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(request): Json<RefundApiRequest>,
) -> ApiResult<Json<Order>> {
    Ok(Json(payments::refund(&state, admin.id, request).await?))
}
