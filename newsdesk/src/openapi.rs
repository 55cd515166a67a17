//! OpenAPI document for the `/api/v1` surface, rendered by Scalar at `/docs`.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

use crate::api;

/// Name of the cookie documented in the security scheme. Deployments that change
/// `auth.session.cookie_name` get the default name in their docs.
const DOCUMENTED_COOKIE_NAME: &str = "newsdesk_session";

struct SessionCookieAddon;

impl Modify for SessionCookieAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "SessionCookie".to_string(),
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    DOCUMENTED_COOKIE_NAME,
                    "Session cookie set by `/authentication/login` and `/authentication/register`",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "newsdesk",
        description = "Accounts, sessions and role-based access control for the newsdesk content site"
    ),
    servers(
        (url = "/api/v1", description = "newsdesk API")
    ),
    modifiers(&SessionCookieAddon),
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::current_identity,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::update_user_role,
    ),
    components(
        schemas(
            api::models::auth::RegisterRequest,
            api::models::auth::LoginRequest,
            api::models::auth::AuthResponse,
            api::models::auth::AuthSuccessResponse,
            api::models::users::Role,
            api::models::users::UserResponse,
            api::models::users::UserUpdate,
            api::models::users::RoleUpdate,
        )
    ),
    tags(
        (name = "authentication", description = "Registration, login and logout"),
        (name = "users", description = "Profiles and role management"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_routes_and_cookie_scheme() {
        let doc = ApiDoc::openapi();

        for path in [
            "/authentication/register",
            "/authentication/login",
            "/authentication/logout",
            "/current-identity",
            "/users",
            "/users/{user_id}",
            "/users/{user_id}/role",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }

        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("SessionCookie"));
        assert!(components.schemas.contains_key("UserResponse"));
    }
}
