//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - **Authentication** (`/api/v1/authentication/*`): Registration, login, logout
//! - **Users** (`/api/v1/users/*`): Profiles, user listing and role management
//!
//! All endpoints are documented with `utoipa`. The rendered documentation is served at
//! `/docs` when the server is running.

pub mod handlers;
pub mod models;
