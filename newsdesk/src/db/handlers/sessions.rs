//! PostgreSQL session store with an in-process cache.

use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use sqlx::PgPool;
use tracing::instrument;

use crate::auth::password::generate_session_token;
use crate::db::{
    errors::Result,
    handlers::repository::{expiry_from_now, SessionStore},
    models::sessions::{SessionRecord, SessionToken},
};
use crate::types::{abbrev_uuid, UserId};

/// Sessions persisted in the `sessions` table.
///
/// Sessions issued by this instance are also written to a bounded cache, so the common
/// case of resolving a cookie skips the round trip. The cache is only filled on
/// `create`: a lookup that misses goes to the table and leaves the cache alone, which
/// keeps a concurrent `destroy` from being undone by a slow reader. Cached entries carry
/// their expiry and are checked against it on every hit.
#[derive(Clone)]
pub struct PgSessions {
    db: PgPool,
    cache: Cache<String, (UserId, DateTime<Utc>)>,
}

impl PgSessions {
    pub fn new(db: PgPool, cache_capacity: u64, cache_ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(cache_capacity).time_to_live(cache_ttl).build();
        Self { db, cache }
    }
}

impl std::fmt::Debug for PgSessions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSessions")
            .field("cached_entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl SessionStore for PgSessions {
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn create(&self, user_id: UserId, ttl: Duration) -> Result<SessionToken> {
        let token = SessionToken::new(generate_session_token());
        let digest = token.digest();
        let expires_at = expiry_from_now(ttl);

        sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&digest)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.db)
            .await?;

        self.cache.insert(digest, (user_id, expires_at)).await;
        Ok(token)
    }

    #[instrument(skip_all, err)]
    async fn resolve(&self, token: &SessionToken) -> Result<Option<UserId>> {
        let digest = token.digest();
        let now = Utc::now();

        if let Some((user_id, expires_at)) = self.cache.get(&digest).await {
            if expires_at <= now {
                self.cache.invalidate(&digest).await;
                return Ok(None);
            }
            tracing::trace!("Session cache hit");
            return Ok(Some(user_id));
        }

        let record = sqlx::query_as::<_, SessionRecord>("SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = $1")
            .bind(&digest)
            .fetch_optional(&self.db)
            .await?;

        Ok(record.filter(|r| !r.is_expired_at(now)).map(|r| r.user_id))
    }

    #[instrument(skip_all, err)]
    async fn destroy(&self, token: &SessionToken) -> Result<()> {
        let digest = token.digest();
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(&digest)
            .execute(&self.db)
            .await?;
        // Row first, then cache: a reader that misses after this point sees no row
        self.cache.invalidate(&digest).await;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
