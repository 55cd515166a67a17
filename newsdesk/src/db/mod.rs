//! Storage layer for accounts and sessions.
//!
//! Everything above this module talks to storage through two object-safe traits,
//! [`handlers::AccountStore`] and [`handlers::SessionStore`]. Which implementation sits
//! behind them is decided once, at start-up, from [`crate::config::StorageConfig`]:
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (API request handlers, IdentityManager)
//! └──────┬──────┘
//!        │  Arc<dyn AccountStore> / Arc<dyn SessionStore>
//!        ↓
//! ┌─────────────────────────────┐
//! │ Stores                      │
//! │  memory:   DashMap backends │
//! │  postgres: PgPool backends  │
//! └─────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: the storage contracts and both backends
//! - [`models`]: record structures shared by the backends
//! - [`errors`]: storage error type
//!
//! # Migrations
//!
//! Migrations live in `migrations/` and are applied by [`Stores::connect`] through
//! [`crate::migrator`] whenever the Postgres backend is selected.

pub mod errors;
pub mod handlers;
pub mod models;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::{PoolSettings, SessionConfig, StorageConfig};
use handlers::{AccountStore, InMemoryAccounts, InMemorySessions, PgAccounts, PgSessions, SessionStore};

/// The storage backends the application runs against
#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub sessions: Arc<dyn SessionStore>,
    /// Present when running against Postgres
    pub pool: Option<PgPool>,
}

impl Stores {
    /// Transient stores. Nothing survives a restart.
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(InMemoryAccounts::new()),
            sessions: Arc::new(InMemorySessions::new()),
            pool: None,
        }
    }

    /// Durable stores over an existing pool. Does not run migrations.
    pub fn postgres(pool: PgPool, sessions: &SessionConfig) -> Self {
        Self {
            accounts: Arc::new(PgAccounts::new(pool.clone())),
            sessions: Arc::new(PgSessions::new(pool.clone(), sessions.cache_capacity, sessions.timeout)),
            pool: Some(pool),
        }
    }

    /// Build the configured backend. For Postgres this connects and runs migrations.
    pub async fn connect(storage: &StorageConfig, sessions: &SessionConfig) -> anyhow::Result<Self> {
        match storage {
            StorageConfig::Memory => {
                info!("Using in-memory storage; accounts and sessions will not survive a restart");
                Ok(Self::in_memory())
            }
            StorageConfig::Postgres { url, pool } => {
                let pg = pool_options(pool)
                    .connect(url)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                crate::migrator().run(&pg).await.context("Failed to run database migrations")?;
                info!("Connected to PostgreSQL and applied migrations");
                Ok(Self::postgres(pg, sessions))
            }
        }
    }

    /// Backend name for logs
    pub fn backend(&self) -> &'static str {
        if self.pool.is_some() { "postgres" } else { "memory" }
    }
}

fn pool_options(settings: &PoolSettings) -> PgPoolOptions {
    let seconds = |s: u64| if s == 0 { None } else { Some(Duration::from_secs(s)) };
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(seconds(settings.idle_timeout_secs))
        .max_lifetime(seconds(settings.max_lifetime_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_from_config() {
        let stores = Stores::connect(&StorageConfig::Memory, &SessionConfig::default()).await.unwrap();
        assert_eq!(stores.backend(), "memory");
        assert!(stores.pool.is_none());
        assert!(stores.accounts.list_all().await.unwrap().is_empty());
    }
}
