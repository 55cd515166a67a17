//! Session cookie handling.
//!
//! The session contract itself ([`crate::db::handlers::SessionStore`]) knows nothing
//! about HTTP; this module maps session tokens to and from `Cookie` / `Set-Cookie`
//! headers.

use axum::http::{HeaderMap, header};

use crate::{config::SessionConfig, db::models::sessions::SessionToken};

/// `Set-Cookie` value carrying a freshly issued session token
pub fn create_session_cookie(token: &SessionToken, config: &SessionConfig) -> String {
    let max_age = config.timeout.as_secs();
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        config.cookie_name,
        token.as_str(),
        config.cookie_same_site,
        max_age
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that makes the browser drop the session cookie
pub fn clear_session_cookie(config: &SessionConfig) -> String {
    let mut cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite={}; Max-Age=0",
        config.cookie_name, config.cookie_same_site
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Find the session token in the request's `Cookie` headers, if any.
///
/// Headers that are not valid UTF-8 and empty cookie values are skipped.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<SessionToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| SessionToken::new(value))
}
