//! HTTP request handlers for all API endpoints.
//!
//! Each handler is responsible for:
//! - Request deserialization
//! - Authorization checks through [`crate::auth::permissions`]
//! - Calling into [`crate::auth::identity::IdentityManager`] or the account store
//! - Response serialization
//!
//! # Handler Modules
//!
//! - [`auth`]: Registration, login and logout
//! - [`users`]: Profile lookup and editing, user listing and role changes
//!
//! # Authentication
//!
//! Handlers take [`crate::auth::identity::Identity`] when anonymous callers are allowed
//! through, and [`crate::api::models::users::CurrentUser`] when a session is required.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`] which converts to the appropriate HTTP status
//! code and response body.

pub mod auth;
pub mod users;
