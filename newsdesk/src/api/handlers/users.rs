use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use crate::{
    AppState,
    api::models::users::{CurrentUser, RoleUpdate, UserResponse, UserUpdate},
    auth::{identity::Identity, permissions},
    errors::{Error, Result},
    types::{Operation, Resource, UserId, UserIdOrCurrent},
};

fn resolve_target(target: UserIdOrCurrent, caller: &CurrentUser) -> UserId {
    match target {
        UserIdOrCurrent::Current(_) => caller.id,
        UserIdOrCurrent::Id(id) => id,
    }
}

fn user_not_found(id: UserId) -> Error {
    Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    }
}

// GET /users - List all users (admin only)
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    description = "List every account. Administrators only.",
    responses(
        (status = 200, description = "List of users", body = [UserResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(State(state): State<AppState>, identity: Identity) -> Result<Json<Vec<UserResponse>>> {
    permissions::require_admin(&identity, Operation::ReadAll, Resource::Users)?;

    let users = state.identity.accounts().list_all().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

// GET /users/{user_id} - Get a single user (or "current")
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Get user",
    description = "Get an account by ID, or the caller's own account with `current`. Any signed-in user may look up a profile.",
    params(
        ("user_id" = String, Path, description = "User ID (UUID) or 'current'"),
    ),
    responses(
        (status = 200, description = "User information", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    current_user: CurrentUser,
) -> Result<Json<UserResponse>> {
    let target_id = resolve_target(user_id, &current_user);

    match state.identity.accounts().get_by_id(target_id).await? {
        Some(user) => Ok(Json(UserResponse::from(user))),
        None => Err(user_not_found(target_id)),
    }
}

// PATCH /users/{user_id} - Update a profile (owner or admin)
#[utoipa::path(
    patch,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Update user profile",
    description = "Change username, avatar or bio. Users may edit their own profile; administrators may edit any.",
    request_body = UserUpdate,
    params(
        ("user_id" = String, Path, description = "User ID (UUID) or 'current'"),
    ),
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid profile data"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - can only update own profile"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Username already taken"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    identity: Identity,
    payload: std::result::Result<Json<UserUpdate>, JsonRejection>,
) -> Result<Json<UserResponse>> {
    let caller = permissions::require_authenticated(&identity)?;
    let target_id = resolve_target(user_id, caller);
    permissions::require_owner_or_admin(&identity, target_id, Operation::UpdateOwn, Resource::Users)?;
    let Json(update) = payload?;

    match state.identity.update_profile(target_id, update.into()).await? {
        Some(user) => Ok(Json(UserResponse::from(user))),
        None => Err(user_not_found(target_id)),
    }
}

// PUT /users/{user_id}/role - Change a user's role (admin only)
#[utoipa::path(
    put,
    path = "/users/{user_id}/role",
    tag = "users",
    summary = "Set user role",
    description = "Grant or revoke administrator rights. Administrators only.",
    request_body = RoleUpdate,
    params(
        ("user_id" = uuid::Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Unknown role"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin access required"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user_role(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    identity: Identity,
    payload: std::result::Result<Json<RoleUpdate>, JsonRejection>,
) -> Result<Json<UserResponse>> {
    permissions::require_admin(&identity, Operation::UpdateAll, Resource::Roles)?;
    let Json(request) = payload?;

    match state.identity.set_role(user_id, request.role).await? {
        Some(user) => Ok(Json(UserResponse::from(user))),
        None => Err(user_not_found(user_id)),
    }
}
