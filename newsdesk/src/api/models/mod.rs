//! API request and response data models.
//!
//! These types define the JSON shapes of the HTTP API and carry `utoipa::ToSchema` so they
//! show up in the generated OpenAPI document. They are separate from the storage records
//! in [`crate::db::models`]; conversions happen through `From` impls, which is where the
//! password hash is dropped.
//!
//! - [`auth`]: registration, login and logout payloads, plus `IntoResponse` wrappers that
//!   attach `Set-Cookie` headers
//! - [`users`]: roles, account responses, profile and role updates

pub mod auth;
pub mod users;
