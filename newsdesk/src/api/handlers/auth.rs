use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use tracing::warn;

use crate::{
    AppState,
    api::models::{
        auth::{AuthResponse, AuthSuccessResponse, LoginRequest, LoginResponse, LogoutResponse, RegisterRequest, RegisterResponse},
        users::{CurrentUser, Role, UserResponse},
    },
    auth::{current_user::SessionCookie, identity::Identity, session},
    errors::Error,
    types::{Operation, Resource},
};

/// Register a new user account
#[utoipa::path(
    post,
    path = "/authentication/register",
    request_body = RegisterRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User registered; anonymous callers are also signed in", body = AuthResponse),
        (status = 400, description = "Invalid input or registration disabled"),
        (status = 403, description = "Only administrators may create admin accounts"),
        (status = 409, description = "Username already taken"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<RegisterResponse, Error> {
    let Json(request) = payload?;
    let caller_is_admin = identity.is_admin();

    if !state.config.auth.registration_enabled && !caller_is_admin {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    // A client may ask for a role, but only an administrator's request can grant admin
    let role = request.role.unwrap_or_default();
    if role == Role::Admin && !caller_is_admin {
        return Err(Error::InsufficientPermissions {
            action: Operation::CreateAll,
            resource: Resource::Roles,
        });
    }

    let created_user = state.identity.register(&request.username, &request.password, role).await?;

    // Anonymous sign-ups are logged straight in; accounts created by someone who is already
    // signed in leave that person's session alone
    let cookie = match identity {
        Identity::Anonymous => match state.identity.start_session(created_user.id).await {
            Ok(token) => Some(session::create_session_cookie(&token, &state.config.auth.session)),
            Err(e) => {
                // The account stays; the client signs in through login instead
                warn!(username = %created_user.username, "Registered account without a session: {e}");
                None
            }
        },
        Identity::Authenticated(_) => None,
    };

    let auth_response = AuthResponse {
        user: UserResponse::from(created_user),
        message: "Registration successful".to_string(),
    };

    Ok(RegisterResponse { auth_response, cookie })
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/authentication/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    SessionCookie(previous): SessionCookie,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<LoginResponse, Error> {
    let Json(request) = payload?;
    let (user, token) = state.identity.login(&request.username, &request.password).await?;

    // Never keep a session that was presented before this login alive next to the new one
    if let Some(previous) = previous {
        if let Err(e) = state.identity.logout(&previous).await {
            warn!("Failed to destroy previous session on login: {e}");
        }
    }

    let cookie = session::create_session_cookie(&token, &state.config.auth.session);

    let auth_response = AuthResponse {
        user: UserResponse::from(user),
        message: "Login successful".to_string(),
    };

    Ok(LoginResponse { auth_response, cookie })
}

/// Logout (destroy the session and clear the cookie)
#[utoipa::path(
    post,
    path = "/authentication/logout",
    tag = "authentication",
    responses(
        (status = 200, description = "Logout successful", body = AuthSuccessResponse),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, SessionCookie(token): SessionCookie) -> Result<LogoutResponse, Error> {
    if let Some(token) = token {
        state.identity.logout(&token).await?;
    }

    let auth_response = AuthSuccessResponse {
        message: "Logout successful".to_string(),
    };

    Ok(LogoutResponse {
        auth_response,
        cookie: session::clear_session_cookie(&state.config.auth.session),
    })
}

/// The account behind the session cookie
#[utoipa::path(
    get,
    path = "/current-identity",
    tag = "authentication",
    responses(
        (status = 200, description = "The signed-in account", body = UserResponse),
        (status = 401, description = "Not signed in"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn current_identity(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<UserResponse>, Error> {
    match state.identity.accounts().get_by_id(current_user.id).await? {
        Some(user) => Ok(Json(UserResponse::from(user))),
        // Removed since the session was resolved
        None => Err(Error::Unauthenticated { message: None }),
    }
}
