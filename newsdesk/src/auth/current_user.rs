use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::{identity::Identity, permissions, session},
    db::models::sessions::SessionToken,
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;
use tracing::{instrument, trace};

/// The raw session token from the request's cookie, if one was sent.
///
/// Used by handlers that need the token itself (logout, login) rather than the
/// identity behind it.
#[derive(Debug, Clone)]
pub struct SessionCookie(pub Option<SessionToken>);

impl FromRequestParts<AppState> for SessionCookie {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> std::result::Result<Self, Self::Rejection> {
        Ok(SessionCookie(session::extract_session_token(
            &parts.headers,
            &state.config.auth.session.cookie_name,
        )))
    }
}

/// Resolves the caller from the session cookie. Never rejects for a missing, unknown or
/// expired session (those are [`Identity::Anonymous`]); only storage failures reject.
impl FromRequestParts<AppState> for Identity {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(identity.clone());
        }

        let SessionCookie(token) = match SessionCookie::from_request_parts(parts, state).await {
            Ok(cookie) => cookie,
            Err(never) => match never {},
        };
        let identity = state.identity.resolve_current(token.as_ref()).await?;
        trace!(authenticated = identity.user().is_some(), "Resolved request identity");

        parts.extensions.insert(identity.clone());
        Ok(identity)
    }
}

/// An authenticated caller; rejects anonymous requests with 401
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let identity = Identity::from_request_parts(parts, state).await?;
        permissions::require_authenticated(&identity).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::create_test_state;
    use axum::http::{Request, header};

    fn parts_with_cookie(cookie: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_no_cookie_is_anonymous() {
        let state = create_test_state();
        let mut parts = parts_with_cookie(None);

        let identity = Identity::from_request_parts(&mut parts, &state).await.unwrap();
        assert!(matches!(identity, Identity::Anonymous));

        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { .. }));
    }

    #[tokio::test]
    async fn test_unknown_cookie_is_anonymous() {
        let state = create_test_state();
        let mut parts = parts_with_cookie(Some("newsdesk_session=forged-token"));

        let identity = Identity::from_request_parts(&mut parts, &state).await.unwrap();
        assert!(matches!(identity, Identity::Anonymous));
    }

    #[tokio::test]
    async fn test_valid_cookie_resolves_user() {
        let state = create_test_state();
        state.identity.register("carol", "secret1", Role::User).await.unwrap();
        let (_, token) = state.identity.login("carol", "secret1").await.unwrap();

        let cookie = format!("theme=dark; newsdesk_session={}", token.as_str());
        let mut parts = parts_with_cookie(Some(&cookie));

        let user = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.username, "carol");
        assert_eq!(user.role, Role::User);
    }
}
