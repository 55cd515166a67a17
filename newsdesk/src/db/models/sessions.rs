//! Storage models for login sessions.

use crate::auth::password::session_token_digest;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// The opaque value handed to the client in the session cookie.
///
/// Stores never keep the raw token; they key records by [`SessionToken::digest`].
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key for this token
    pub fn digest(&self) -> String {
        session_token_digest(&self.0)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// A stored session row
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    /// Digest of the session token
    pub id: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    #[allow(dead_code)]
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
