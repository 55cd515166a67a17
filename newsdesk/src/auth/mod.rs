//! Authentication and authorization.
//!
//! Browsers authenticate with a session cookie:
//! - Users register via `/authentication/register` and log in via `/authentication/login`
//!   with username and password
//! - The login response sets an HTTP-only cookie holding a random session token
//! - The token is looked up in the configured session store on every request
//! - Logging out destroys the session; sessions also expire after `auth.session.timeout`
//!
//! # Authorization
//!
//! Two roles exist, `user` and `admin`. Mutating operations on a resource are allowed to
//! its owner and to administrators. See [`permissions`].
//!
//! # Modules
//!
//! - [`current_user`]: Extractors for getting the caller in handlers
//! - [`identity`]: Registration, login, logout and session resolution
//! - [`password`]: Password hashing and verification using Argon2, session tokens
//! - [`permissions`]: Authorization guards
//! - [`session`]: Session cookie helpers
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use newsdesk::api::models::users::CurrentUser;
//! use newsdesk::auth::{identity::Identity, permissions};
//!
//! async fn protected_handler(current_user: CurrentUser) -> String {
//!     format!("Hello, {}!", current_user.username)
//! }
//!
//! async fn edit_story(identity: Identity, Path(story): Path<Story>) -> Result<(), Error> {
//!     permissions::require_owner_or_admin(&identity, story.author_id, Operation::UpdateOwn, Resource::News)?;
//!     // ...
//! }
//! ```

pub mod current_user;
pub mod identity;
pub mod password;
pub mod permissions;
pub mod session;
