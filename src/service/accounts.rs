//! Registration, password and SMS login, and admin onboarding.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{hash_password, verify_password, PrincipalKind};
use crate::domain::sms::{self, SmsCode, SmsPurpose, RATE_LIMIT_SECONDS};
use crate::domain::user::{Admin, AdminRole, User};
use crate::error::{ApiError, ApiResult};
use crate::service::sms::deliver;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 20, message = "username must be 3-20 characters"))]
    pub username: String,
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserSession {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct AdminSession {
    pub token: String,
    pub admin: Admin,
}

pub async fn register(state: &AppState, request: RegisterRequest) -> ApiResult<UserSession> {
    request.validate()?;
    if let Some(phone) = &request.phone {
        if !sms::is_valid_phone(phone) {
            return Err(ApiError::Validation("invalid phone number".into()));
        }
    }
    if state.users.get_by_email(&request.email).await?.is_some() {
        return Err(ApiError::Conflict("email is already registered".into()));
    }
    if state
        .users
        .get_by_username(&request.username)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("username is already taken".into()));
    }
    let hash = hash_password(&request.password)?;
    let mut user = User::new(request.username, request.email, hash);
    user.phone = request.phone;
    let user = state.users.insert(user).await?;
    let token = state.tokens.issue(user.id, PrincipalKind::User)?;
    info!(user_id = %user.id, "user registered");
    Ok(UserSession { token, user })
}

pub async fn login(state: &AppState, request: LoginRequest) -> ApiResult<UserSession> {
    request.validate()?;
    // One generic message for every failure mode; credential probes learn
    // nothing about which field was wrong.
    let denied = || ApiError::Unauthorized("invalid email or password".into());
    let mut user = state
        .users
        .get_by_email(&request.email)
        .await?
        .ok_or_else(denied)?;
    if !user.is_active || !verify_password(&request.password, &user.password_hash)? {
        return Err(denied());
    }
    user.last_login = Some(Utc::now());
    user.updated_at = Utc::now();
    state.users.update(&user).await?;
    let token = state.tokens.issue(user.id, PrincipalKind::User)?;
    Ok(UserSession { token, user })
}

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub phone: String,
    #[serde(default)]
    pub purpose: SmsPurpose,
}

#[derive(Debug, Serialize)]
pub struct SendCodeResponse {
    pub expires_in_minutes: i64,
    /// Populated only when code echoing is enabled for development.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

pub async fn send_code(state: &AppState, request: SendCodeRequest) -> ApiResult<SendCodeResponse> {
    if !sms::is_valid_phone(&request.phone) {
        return Err(ApiError::Validation("invalid phone number".into()));
    }
    if let Some(last) = state.sms_codes.last_issued_at(&request.phone).await? {
        if (Utc::now() - last).num_seconds() < RATE_LIMIT_SECONDS {
            return Err(ApiError::BusinessRule(
                "a code was sent recently, please wait before retrying".into(),
            ));
        }
    }
    let issued = state
        .sms_codes
        .insert(SmsCode::issue(request.phone.clone(), request.purpose))
        .await?;
    deliver(&issued.phone, &issued.code, issued.purpose);
    Ok(SendCodeResponse {
        expires_in_minutes: sms::CODE_TTL_MINUTES,
        code: state.echo_sms_codes.then(|| issued.code),
    })
}

#[derive(Debug, Deserialize)]
pub struct SmsLoginRequest {
    pub phone: String,
    pub code: String,
}

/// Code login; a phone never seen before gets an account on the spot.
pub async fn sms_login(state: &AppState, request: SmsLoginRequest) -> ApiResult<UserSession> {
    let consumed = state
        .sms_codes
        .consume(&request.phone, &request.code, SmsPurpose::Login, Utc::now())
        .await?;
    if !consumed {
        return Err(ApiError::Unauthorized("invalid or expired code".into()));
    }
    let mut user = match state.users.get_by_phone(&request.phone).await? {
        Some(user) => user,
        None => {
            let suffix = &request.phone[request.phone.len() - 4..];
            let username = format!("user_{}{}", suffix, &Uuid::new_v4().simple().to_string()[..6]);
            let email = format!("{}@phone.local", request.phone);
            // Random throwaway credential; password login stays closed
            // until the user sets one.
            let hash = hash_password(&Uuid::new_v4().to_string())?;
            let mut user = User::new(username, email, hash);
            user.phone = Some(request.phone.clone());
            let user = state.users.insert(user).await?;
            info!(user_id = %user.id, "account auto-created from phone login");
            user
        }
    };
    if !user.is_active {
        return Err(ApiError::Unauthorized("account is disabled".into()));
    }
    user.last_login = Some(Utc::now());
    user.updated_at = Utc::now();
    state.users.update(&user).await?;
    let token = state.tokens.issue(user.id, PrincipalKind::User)?;
    Ok(UserSession { token, user })
}

pub async fn admin_login(state: &AppState, request: LoginRequest) -> ApiResult<AdminSession> {
    request.validate()?;
    let denied = || ApiError::Unauthorized("invalid email or password".into());
    let admin = state
        .users
        .get_admin_by_email(&request.email)
        .await?
        .ok_or_else(denied)?;
    if !admin.is_active || !verify_password(&request.password, &admin.password_hash)? {
        return Err(denied());
    }
    let token = state.tokens.issue(admin.id, PrincipalKind::Admin)?;
    Ok(AdminSession { token, admin })
}

#[derive(Debug, Deserialize, Validate)]
pub struct AdminRegisterRequest {
    #[validate(length(min = 3, max = 20, message = "username must be 3-20 characters"))]
    pub username: String,
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    pub role: AdminRole,
}

/// Only a super admin can mint admin accounts.
pub async fn admin_register(
    state: &AppState,
    actor: &Admin,
    request: AdminRegisterRequest,
) -> ApiResult<Admin> {
    if !actor.role.at_least(AdminRole::SuperAdmin) {
        return Err(ApiError::Forbidden(
            "super admin privileges required".into(),
        ));
    }
    request.validate()?;
    if state
        .users
        .get_admin_by_email(&request.email)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("email is already registered".into()));
    }
    let hash = hash_password(&request.password)?;
    let admin = state
        .users
        .insert_admin(Admin::new(
            request.username,
            request.email,
            hash,
            request.role,
        ))
        .await?;
    info!(admin_id = %admin.id, created_by = %actor.id, "admin account created");
    Ok(admin)
}

pub async fn list_admins(state: &AppState, actor: &Admin) -> ApiResult<Vec<Admin>> {
    if !actor.role.at_least(AdminRole::SuperAdmin) {
        return Err(ApiError::Forbidden(
            "super admin privileges required".into(),
        ));
    }
    state.users.list_admins().await
}
