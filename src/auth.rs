//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs carrying the subject id and the principal kind
//! (user vs admin). The extractors verify the token, load the principal
//! from the matching store and reject inactive or missing accounts.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::user::{Admin, Principal, User};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    User,
    Admin,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: PrincipalKind,
    pub exp: usize,
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, sub: Uuid, kind: PrincipalKind) -> ApiResult<String> {
        let exp = (Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_default())
            .timestamp() as usize;
        let claims = Claims { sub, kind, exp };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(e.into()))
    }

    pub fn verify(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthorized("invalid or expired token".into()))
    }
}

pub fn hash_password(plain: &str) -> ApiResult<String> {
    bcrypt::hash(plain, bcrypt::DEFAULT_COST).map_err(|e| ApiError::Internal(e.into()))
}

pub fn verify_password(plain: &str, hash: &str) -> ApiResult<bool> {
    bcrypt::verify(plain, hash).map_err(|e| ApiError::Internal(e.into()))
}

fn bearer_token(parts: &Parts) -> ApiResult<&str> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))
}

async fn load_principal(state: &AppState, claims: &Claims) -> ApiResult<Principal> {
    match claims.kind {
        PrincipalKind::User => {
            let user = state
                .users
                .get(claims.sub)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("account no longer exists".into()))?;
            if !user.is_active {
                return Err(ApiError::Unauthorized("account is disabled".into()));
            }
            Ok(Principal::User(user))
        }
        PrincipalKind::Admin => {
            let admin = state
                .users
                .get_admin(claims.sub)
                .await?
                .ok_or_else(|| ApiError::Unauthorized("account no longer exists".into()))?;
            if !admin.is_active {
                return Err(ApiError::Unauthorized("account is disabled".into()));
            }
            Ok(Principal::Admin(admin))
        }
    }
}

/// Any authenticated principal (buyer or admin).
pub struct CurrentPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let token = bearer_token(parts)?;
        let claims = state.tokens.verify(token)?;
        Ok(Self(load_principal(state, &claims).await?))
    }
}

/// An authenticated buyer. Admin tokens are rejected here; the user-facing
/// endpoints operate on the caller's own account.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        match CurrentPrincipal::from_request_parts(parts, state).await?.0 {
            Principal::User(user) => Ok(Self(user)),
            Principal::Admin(_) => Err(ApiError::Forbidden(
                "endpoint requires a user account".into(),
            )),
        }
    }
}

/// An authenticated administrator.
pub struct CurrentAdmin(pub Admin);

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        match CurrentPrincipal::from_request_parts(parts, state).await?.0 {
            Principal::Admin(admin) => Ok(Self(admin)),
            Principal::User(_) => Err(ApiError::Forbidden("admin role required".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify_roundtrip() {
        let keys = TokenKeys::new("test-secret", Duration::from_secs(60));
        let id = Uuid::new_v4();
        let token = keys.issue(id, PrincipalKind::Admin).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.kind, PrincipalKind::Admin);
    }

    #[test]
    fn wrong_secret_rejected() {
        let keys = TokenKeys::new("a", Duration::from_secs(60));
        let other = TokenKeys::new("b", Duration::from_secs(60));
        let token = keys.issue(Uuid::new_v4(), PrincipalKind::User).unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn password_hashing_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }
}
