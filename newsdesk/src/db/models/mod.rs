//! Storage record models.
//!
//! These structs correspond to rows in the `users` and `sessions` tables and are shared
//! by both storage backends. They are kept separate from the API models in
//! [`crate::api::models`] so that the stored representation (which includes the password
//! hash) never ends up in a response body by accident.
//!
//! - [`users`]: accounts and the create/update requests the stores accept
//! - [`sessions`]: session records and the [`sessions::SessionToken`] newtype

pub mod sessions;
pub mod users;
