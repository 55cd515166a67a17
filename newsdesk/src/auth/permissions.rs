//! Authorization checks.
//!
//! Two roles exist: `user` and `admin`, and administrators may do everything users may.
//! Resource ownership is decided by the caller passing the owner's id, so the same checks
//! serve accounts, news items and projects alike.
//!
//! The `can_*` predicates answer yes/no; the `require_*` guards return the authenticated
//! [`CurrentUser`] (for stamping owner ids) or the error to send back. All of them are
//! pure functions of their arguments.

use crate::{
    api::models::users::CurrentUser,
    auth::identity::Identity,
    errors::{Error, Result},
    types::{Operation, Resource, UserId},
};

/// Whether the user may perform `*All` operations
pub fn can_act_on_all_resources(user: &CurrentUser) -> bool {
    user.is_admin()
}

/// Whether the user may act on a resource owned by `owner_id`
pub fn can_act_on_own_resource(user: &CurrentUser, owner_id: UserId) -> bool {
    user.is_admin() || user.id == owner_id
}

/// Any authenticated caller
pub fn require_authenticated(identity: &Identity) -> Result<&CurrentUser> {
    identity.user().ok_or(Error::Unauthenticated { message: None })
}

/// Administrators only. Anonymous callers are asked to authenticate first.
pub fn require_admin(identity: &Identity, action: Operation, resource: Resource) -> Result<&CurrentUser> {
    let user = require_authenticated(identity)?;
    if can_act_on_all_resources(user) {
        Ok(user)
    } else {
        Err(Error::InsufficientPermissions { action, resource })
    }
}

/// The owner of the resource or an administrator
pub fn require_owner_or_admin(identity: &Identity, owner_id: UserId, action: Operation, resource: Resource) -> Result<&CurrentUser> {
    let user = require_authenticated(identity)?;
    if can_act_on_own_resource(user, owner_id) {
        Ok(user)
    } else {
        Err(Error::InsufficientPermissions { action, resource })
    }
}
