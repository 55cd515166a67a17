//! Storage contracts shared by every backend.
//!
//! Both traits are object safe and are used as `Arc<dyn AccountStore>` /
//! `Arc<dyn SessionStore>`, so the backend is picked once at start-up (see
//! [`crate::db::Stores`]) and call sites never know which one is active.

use std::time::Duration;

use crate::api::models::users::Role;
use crate::db::{
    errors::Result,
    models::{
        sessions::SessionToken,
        users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use crate::types::UserId;

/// Durable storage for user accounts.
///
/// Username uniqueness is enforced by the store at write time: `create` and
/// `update_profile` fail with [`crate::db::errors::DbError::UniqueViolation`] when the
/// name is taken, and leave nothing partially written behind.
#[async_trait::async_trait]
pub trait AccountStore: Send + Sync {
    /// Get an account by ID
    async fn get_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>>;

    /// Get an account by exact username
    async fn get_by_username(&self, username: &str) -> Result<Option<UserDBResponse>>;

    /// All accounts, oldest first
    async fn list_all(&self) -> Result<Vec<UserDBResponse>>;

    /// Create an account with a freshly generated ID
    async fn create(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;

    /// Apply the provided profile fields. `None` when the account does not exist.
    async fn update_profile(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<Option<UserDBResponse>>;

    /// Change an account's role. `None` when the account does not exist.
    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<UserDBResponse>>;

    /// Replace the stored password hash. Returns whether the account existed.
    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> Result<bool>;
}

/// Storage for login sessions, keyed by the digest of the session token.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Issue a new session for `user_id` that expires after `ttl`
    async fn create(&self, user_id: UserId, ttl: Duration) -> Result<SessionToken>;

    /// The account a token belongs to, or `None` for unknown and expired tokens
    async fn resolve(&self, token: &SessionToken) -> Result<Option<UserId>>;

    /// Remove a session. Destroying an unknown token is not an error.
    async fn destroy(&self, token: &SessionToken) -> Result<()>;

    /// Physically remove expired sessions, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

/// Absolute expiry for a session created now with the given lifetime
pub(crate) fn expiry_from_now(ttl: Duration) -> chrono::DateTime<chrono::Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    chrono::Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}
