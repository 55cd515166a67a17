//! Storage backends.
//!
//! The contracts live in [`repository`]: [`AccountStore`] for accounts and
//! [`SessionStore`] for login sessions. Each has two implementations:
//!
//! - [`PgAccounts`] / [`PgSessions`]: durable, backed by PostgreSQL through a shared
//!   [`sqlx::PgPool`]. Sessions additionally keep a bounded in-process cache.
//! - [`InMemoryAccounts`] / [`InMemorySessions`]: transient, backed by `DashMap`s.
//!   Used for tests and for running without a database.
//!
//! # Usage
//!
//! ```ignore
//! use newsdesk::db::handlers::{AccountStore, InMemoryAccounts};
//!
//! let accounts: Arc<dyn AccountStore> = Arc::new(InMemoryAccounts::new());
//! if let Some(user) = accounts.get_by_username("bob").await? {
//!     println!("Found user: {}", user.username);
//! }
//! ```

pub mod memory;
pub mod repository;
pub mod sessions;
pub mod users;

pub use memory::{InMemoryAccounts, InMemorySessions};
pub use repository::{AccountStore, SessionStore};
pub use sessions::PgSessions;
pub use users::PgAccounts;
