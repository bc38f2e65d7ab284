//! Authentication endpoints for shoppers and back-office admins.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::auth::{CurrentAdmin, CurrentUser};
use crate::error::ApiResult;
use crate::service::accounts::{
    self, AdminRegisterRequest, AdminSession, LoginRequest, RegisterRequest, SendCodeRequest,
    SendCodeResponse, SmsLoginRequest, UserSession,
};
use crate::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserSession>)> {
    let session = accounts::register(&state, request).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<UserSession>> {
    Ok(Json(accounts::login(&state, request).await?))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<Value> {
    Json(json!({ "user": user }))
}

pub async fn send_sms_code(
    State(state): State<AppState>,
    Json(request): Json<SendCodeRequest>,
) -> ApiResult<Json<SendCodeResponse>> {
    Ok(Json(accounts::send_code(&state, request).await?))
}

pub async fn sms_login(
    State(state): State<AppState>,
    Json(request): Json<SmsLoginRequest>,
) -> ApiResult<Json<UserSession>> {
    Ok(Json(accounts::sms_login(&state, request).await?))
}

pub async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<AdminSession>> {
    Ok(Json(accounts::admin_login(&state, request).await?))
}

pub async fn admin_me(CurrentAdmin(admin): CurrentAdmin) -> Json<Value> {
    Json(json!({ "admin": admin }))
}

pub async fn admin_register(
    State(state): State<AppState>,
    CurrentAdmin(actor): CurrentAdmin,
    Json(request): Json<AdminRegisterRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let admin = accounts::admin_register(&state, &actor, request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "admin": admin }))))
}

pub async fn list_admins(
    State(state): State<AppState>,
    CurrentAdmin(actor): CurrentAdmin,
) -> ApiResult<Json<Value>> {
    let admins = accounts::list_admins(&state, &actor).await?;
    Ok(Json(json!({ "admins": admins })))
}
