//! Storage models for user accounts.

use crate::api::models::users::{Role, UserUpdate};
use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Storage request for creating a new account
#[derive(Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    /// `None` stores the default role
    pub role: Option<Role>,
}

impl std::fmt::Debug for UserCreateDBRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCreateDBRequest")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("avatar_url", &self.avatar_url)
            .field("bio", &self.bio)
            .field("role", &self.role)
            .finish()
    }
}

/// Storage request for a profile update. Only the fields that are `Some` are written.
///
/// There is deliberately no role or password field here; those change through
/// [`crate::db::handlers::AccountStore::set_role`] and
/// [`crate::db::handlers::AccountStore::set_password_hash`].
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
}

impl From<UserUpdate> for UserUpdateDBRequest {
    fn from(update: UserUpdate) -> Self {
        Self {
            username: update.username,
            avatar_url: update.avatar_url,
            bio: update.bio,
        }
    }
}

/// A stored account. Carries the password hash, so it is never serialized; convert it
/// into [`crate::api::models::users::UserResponse`] before it leaves the service.
#[derive(Clone, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for UserDBResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDBResponse")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
