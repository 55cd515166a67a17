//! # newsdesk: accounts, sessions and access control for a news site
//!
//! `newsdesk` is the identity service behind a news and projects content site. It lets people
//! register and log in with a username and password, keeps them signed in with a session cookie,
//! and decides what each caller may do: anyone may read, signed-in users may manage what they own,
//! and administrators may manage everything.
//!
//! ## Architecture
//!
//! The HTTP layer is built on [Axum](https://github.com/tokio-rs/axum). Storage sits behind two
//! traits, one for accounts and one for sessions, with an in-memory implementation (handy for
//! development and tests) and a PostgreSQL implementation for production. The backend is chosen
//! in configuration; nothing above the [`db`] module knows which one is running.
//!
//! ### Request Flow
//!
//! A request to `/api/v1/*` carries (or doesn't carry) the session cookie. Handlers ask for an
//! [`auth::identity::Identity`], which is resolved once per request from that cookie: a missing,
//! forged or expired session simply makes the caller anonymous. Handlers then apply one of the
//! guards in [`auth::permissions`] before touching storage.
//!
//! ### Core Components
//!
//! - **API layer** ([`api`]): route handlers and request/response models
//! - **Authentication layer** ([`auth`]): password hashing, session cookies, the
//!   [`auth::identity::IdentityManager`] and authorization guards
//! - **Storage layer** ([`db`]): the storage traits, both backends and the migrations
//! - **Configuration** ([`config`]): YAML file plus `NEWSDESK_`-prefixed environment overrides
//!
//! ### Background Services
//!
//! A single background task purges expired sessions every `auth.session.purge_interval`.
//! Expired sessions are already ignored on lookup; purging only reclaims the storage.
//!
//! ## Getting Started
//!
//! ```bash
//! newsdesk -f config.yaml
//! ```
//!
//! With no configuration at all the service starts on port 3001 with in-memory storage. Setting
//! `DATABASE_URL` switches to PostgreSQL and applies migrations on start-up. Setting
//! `NEWSDESK_ADMIN_PASSWORD` creates (or resets) the administrator named by `admin_username`.
//!
//! API documentation is served at `/docs`.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod openapi;
pub mod telemetry;
#[cfg(test)]
pub mod test_utils;
pub mod types;

use std::time::Duration;

use axum::{
    Json, Router,
    http::{self, HeaderValue},
    routing::{get, post, put},
};
use bon::Builder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

use crate::{
    auth::identity::IdentityManager,
    config::{CorsConfig, CorsOrigin},
    db::Stores,
    openapi::ApiDoc,
};

/// Shared application state passed to every handler.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .stores(stores.clone())
///     .identity(IdentityManager::new(&stores, &config.auth))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub identity: IdentityManager,
}

/// Get the newsdesk database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create CORS layer from configuration
fn create_cors_layer(cors: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let allow_origin = if cors.allowed_origins.contains(&CorsOrigin::Wildcard) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::with_capacity(cors.allowed_origins.len());
        for origin in &cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Browsers send the bare origin, so drop any path or trailing slash
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_credentials(cors.allow_credentials);

    if let Some(max_age) = cors.max_age {
        layer = layer.max_age(Duration::from_secs(max_age));
    }

    Ok(layer)
}

/// Build the application router: authentication and user routes under `/api/v1`, the
/// health check, API documentation, CORS and request tracing.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/authentication/register", post(api::handlers::auth::register))
        .route("/authentication/login", post(api::handlers::auth::login))
        .route("/authentication/logout", post(api::handlers::auth::logout))
        .route("/current-identity", get(api::handlers::auth::current_identity));

    let user_routes = Router::new()
        .route("/users", get(api::handlers::users::list_users))
        .route(
            "/users/{user_id}",
            get(api::handlers::users::get_user).patch(api::handlers::users::update_user),
        )
        .route("/users/{user_id}/role", put(api::handlers::users::update_user_role));

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1", auth_routes.merge(user_routes))
        .with_state(state.clone())
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let router = router.layer(create_cors_layer(&state.config.auth.cors)?);

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Background tasks that run alongside the HTTP server.
///
/// Dropping this without calling [`shutdown`](BackgroundServices::shutdown) still cancels
/// the tasks through the drop guard.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
    _drop_guard: tokio_util::sync::DropGuard,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();
        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

fn setup_background_services(stores: &Stores, config: &Config, shutdown_token: CancellationToken) -> BackgroundServices {
    let drop_guard = shutdown_token.clone().drop_guard();
    let sessions = stores.sessions.clone();
    let interval = config.auth.session.purge_interval;
    let token = shutdown_token.clone();

    let purge_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so start-up isn't slowed by a purge
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Session purge task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match sessions.purge_expired().await {
                        Ok(0) => {}
                        Ok(purged) => info!(purged, "Purged expired sessions"),
                        Err(e) => warn!("Failed to purge expired sessions: {e}"),
                    }
                }
            }
        }
    });

    BackgroundServices {
        background_tasks: vec![purge_task],
        shutdown_token,
        _drop_guard: drop_guard,
    }
}

/// The assembled service.
///
/// 1. **Create**: [`Application::new`] connects storage, runs migrations, bootstraps the
///    administrator and starts background services
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
    stores: Stores,
    bg_services: BackgroundServices,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Config's Debug output would include the admin password and database URL
        debug!(
            host = %config.host,
            port = config.port,
            registration_enabled = config.auth.registration_enabled,
            "Starting newsdesk"
        );

        let stores = Stores::connect(&config.storage, &config.auth.session).await?;
        let identity = IdentityManager::new(&stores, &config.auth);

        if let Some(password) = config.admin_password.as_deref() {
            let admin_id = identity.bootstrap_admin(&config.admin_username, password).await?;
            info!(user_id = %types::abbrev_uuid(&admin_id), username = %config.admin_username, "Administrator account ready");
        }

        let bg_services = setup_background_services(&stores, &config, CancellationToken::new());

        let app_state = AppState::builder()
            .config(config.clone())
            .stores(stores.clone())
            .identity(identity)
            .build();
        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            config,
            stores,
            bg_services,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            storage = self.stores.backend(),
            "newsdesk listening on http://{}, available at http://localhost:{}", bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.bg_services.shutdown().await;

        if let Some(pool) = &self.stores.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
