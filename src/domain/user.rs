//! User and admin identities. The two live in separate stores and are
//! distinguished in the bearer token by principal kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    #[default]
    Admin,
    SuperAdmin,
}

impl AdminRole {
    fn rank(self) -> u8 {
        match self {
            AdminRole::Admin => 1,
            AdminRole::SuperAdmin => 2,
        }
    }

    /// Manually coded rank comparison; no policy engine behind this.
    pub fn at_least(self, required: AdminRole) -> bool {
        self.rank() >= required.rank()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// Bcrypt hash; never serialized into responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            phone: None,
            role: UserRole::User,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Admin {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: AdminRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admin {
    pub fn new(username: String, email: String, password_hash: String, role: AdminRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The authenticated caller, as loaded by the token extractor.
#[derive(Clone, Debug)]
pub enum Principal {
    User(User),
    Admin(Admin),
}

impl Principal {
    pub fn id(&self) -> Uuid {
        match self {
            Principal::User(u) => u.id,
            Principal::Admin(a) => a.id,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin(_))
    }

    /// Owner-or-admin check used by order and payment reads.
    pub fn may_access(&self, owner: Uuid) -> bool {
        self.is_admin() || self.id() == owner
    }
}
