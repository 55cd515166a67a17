//! Shared helpers for unit and HTTP tests.

use crate::{
    AppState,
    api::models::users::Role,
    auth::identity::IdentityManager,
    config::{Config, StorageConfig},
    db::{
        Stores,
        models::{sessions::SessionToken, users::UserDBResponse},
    },
};
use axum::http::{HeaderName, HeaderValue, header};
use axum_test::{TestResponse, TestServer};

/// Password given to every account made by [`create_test_user`]
pub const TEST_PASSWORD: &str = "test-password";

/// In-memory storage, cheap hashing and plain-HTTP cookies
pub fn create_test_config() -> Config {
    let mut config = Config {
        storage: StorageConfig::Memory,
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    config.auth.password.argon2_memory_kib = 1024;
    config.auth.password.argon2_iterations = 1;
    config.auth.password.argon2_parallelism = 1;
    config.auth.session.cookie_secure = false;
    config
}

pub fn test_stores() -> Stores {
    Stores::in_memory()
}

pub fn test_identity_manager(stores: &Stores) -> IdentityManager {
    IdentityManager::new(stores, &create_test_config().auth)
}

pub fn create_test_state_with_config(config: Config) -> AppState {
    let stores = test_stores();
    let identity = IdentityManager::new(&stores, &config.auth);
    AppState::builder().config(config).stores(stores).identity(identity).build()
}

pub fn create_test_state() -> AppState {
    create_test_state_with_config(create_test_config())
}

pub fn create_test_app_with_config(config: Config) -> (TestServer, AppState) {
    let state = create_test_state_with_config(config);
    let router = crate::build_router(&state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, state)
}

pub fn create_test_app() -> (TestServer, AppState) {
    create_test_app_with_config(create_test_config())
}

/// Register an account with [`TEST_PASSWORD`] and log it in
pub async fn create_test_user(state: &AppState, username: &str, role: Role) -> (UserDBResponse, SessionToken) {
    state
        .identity
        .register(username, TEST_PASSWORD, role)
        .await
        .expect("Failed to create test user");
    state
        .identity
        .login(username, TEST_PASSWORD)
        .await
        .expect("Failed to log in test user")
}

/// Cookie header carrying the given session
pub fn add_auth_headers(token: &SessionToken) -> (HeaderName, HeaderValue) {
    let config = create_test_config();
    let value = format!("{}={}", config.auth.session.cookie_name, token.as_str());
    (
        header::COOKIE,
        HeaderValue::from_str(&value).expect("Session token is not a valid header value"),
    )
}

/// The session token set by a response, if it set a non-empty one
pub fn session_token_from(response: &TestResponse) -> Option<SessionToken> {
    let cookie_name = create_test_config().auth.session.cookie_name;
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| SessionToken::new(value.to_string()))
}
