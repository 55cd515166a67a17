//! Login, registration and resolution of the caller behind a session token.
//!
//! [`IdentityManager`] is the only component that combines the two stores. Handlers and
//! extractors go through it rather than touching [`SessionStore`] and [`AccountStore`]
//! directly, so the rules below hold regardless of the storage backend:
//!
//! - only Argon2 digests of passwords are stored
//! - a failed login reports the same [`Error::InvalidCredentials`] whether the username
//!   was unknown or the password wrong, and costs one password verification either way
//! - every successful login issues a new session token
//! - a token that is unknown, expired, or whose account is gone resolves to
//!   [`Identity::Anonymous`], while storage failures propagate

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::{
    api::models::users::{CurrentUser, Role},
    auth::password::{self, Argon2Params},
    config::AuthConfig,
    db::{
        handlers::{AccountStore, SessionStore},
        models::{
            sessions::SessionToken,
            users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
        },
        Stores,
    },
    errors::{Error, Result},
    types::{abbrev_uuid, UserId},
};

/// Inclusive bounds on username length, in characters
pub const USERNAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=50;
/// Maximum bio length, in characters
pub const BIO_MAX_LENGTH: usize = 500;

const DUMMY_PASSWORD: &str = "newsdesk-timing-equaliser";

/// Who is making a request
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Authenticated(CurrentUser),
}

impl Identity {
    pub fn user(&self) -> Option<&CurrentUser> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(CurrentUser::is_admin)
    }
}

#[derive(Clone)]
pub struct IdentityManager {
    accounts: Arc<dyn AccountStore>,
    sessions: Arc<dyn SessionStore>,
    session_ttl: Duration,
    argon2: Argon2Params,
    password_length: std::ops::RangeInclusive<usize>,
    /// Hash verified against when the username is unknown
    dummy_hash: Arc<OnceCell<String>>,
}

impl IdentityManager {
    pub fn new(stores: &Stores, config: &AuthConfig) -> Self {
        Self {
            accounts: stores.accounts.clone(),
            sessions: stores.sessions.clone(),
            session_ttl: config.session.timeout,
            argon2: config.password.argon2_params(),
            password_length: config.password.min_length..=config.password.max_length,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    /// Create an account with the given role.
    ///
    /// The role is stored as given; deciding who may ask for `admin` is the caller's job.
    #[instrument(skip(self, password), fields(username = %username), err)]
    pub async fn register(&self, username: &str, password: &str, role: Role) -> Result<UserDBResponse> {
        validate_username(username)?;
        self.validate_password(password)?;

        let password_hash = self.hash_password(password).await?;
        let user = self
            .accounts
            .create(&UserCreateDBRequest {
                username: username.to_string(),
                password_hash,
                avatar_url: None,
                bio: None,
                role: Some(role),
            })
            .await
            .map_err(Error::from_account_write)?;

        info!(user_id = %abbrev_uuid(&user.id), role = ?user.role, "Registered account");
        Ok(user)
    }

    /// Check credentials and open a new session
    #[instrument(skip(self, password), fields(username = %username), err)]
    pub async fn login(&self, username: &str, password: &str) -> Result<(UserDBResponse, SessionToken)> {
        let user = self.accounts.get_by_username(username).await?;

        let hash = match &user {
            Some(user) => user.password_hash.clone(),
            None => self.dummy_hash().await?,
        };
        let valid = self.verify_password(password, hash).await?;

        let user = match user {
            Some(user) if valid => user,
            _ => {
                debug!("Login rejected");
                return Err(Error::InvalidCredentials);
            }
        };

        let token = self.start_session(user.id).await?;
        info!(user_id = %abbrev_uuid(&user.id), "Login successful");
        Ok((user, token))
    }

    /// Issue a session for an account that has already been authenticated
    pub async fn start_session(&self, user_id: UserId) -> Result<SessionToken> {
        Ok(self.sessions.create(user_id, self.session_ttl).await?)
    }

    /// Resolve the caller behind a session token
    #[instrument(skip_all, err)]
    pub async fn resolve_current(&self, token: Option<&SessionToken>) -> Result<Identity> {
        let Some(token) = token else {
            return Ok(Identity::Anonymous);
        };
        let Some(user_id) = self.sessions.resolve(token).await? else {
            debug!("Session token is unknown or expired");
            return Ok(Identity::Anonymous);
        };
        match self.accounts.get_by_id(user_id).await? {
            Some(user) => Ok(Identity::Authenticated(user.into())),
            None => {
                debug!(user_id = %abbrev_uuid(&user_id), "Session refers to a missing account");
                Ok(Identity::Anonymous)
            }
        }
    }

    /// End a session. Unknown and already-ended sessions are fine.
    #[instrument(skip_all, err)]
    pub async fn logout(&self, token: &SessionToken) -> Result<()> {
        Ok(self.sessions.destroy(token).await?)
    }

    /// Validate and apply a profile change. Role and password are not reachable from here.
    #[instrument(skip(self, update), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn update_profile(&self, id: UserId, update: UserUpdateDBRequest) -> Result<Option<UserDBResponse>> {
        if let Some(username) = &update.username {
            validate_username(username)?;
        }
        if let Some(bio) = &update.bio {
            if bio.chars().count() > BIO_MAX_LENGTH {
                return Err(Error::BadRequest {
                    message: format!("Bio must be no more than {BIO_MAX_LENGTH} characters"),
                });
            }
        }
        self.accounts
            .update_profile(id, &update)
            .await
            .map_err(Error::from_account_write)
    }

    /// The administrator elevation path
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    pub async fn set_role(&self, id: UserId, role: Role) -> Result<Option<UserDBResponse>> {
        let user = self.accounts.set_role(id, role).await?;
        if user.is_some() {
            info!(role = ?role, "Account role changed");
        }
        Ok(user)
    }

    /// Ensure an administrator account with this username and password exists.
    ///
    /// An existing account is promoted if needed and gets its password reset to the
    /// configured one.
    #[instrument(skip(self, password), fields(username = %username), err)]
    pub async fn bootstrap_admin(&self, username: &str, password: &str) -> Result<UserId> {
        let password_hash = self.hash_password(password).await?;

        if let Some(existing) = self.accounts.get_by_username(username).await? {
            self.accounts.set_password_hash(existing.id, &password_hash).await?;
            if existing.role != Role::Admin {
                self.accounts.set_role(existing.id, Role::Admin).await?;
            }
            return Ok(existing.id);
        }

        let created = self
            .accounts
            .create(&UserCreateDBRequest {
                username: username.to_string(),
                password_hash,
                avatar_url: None,
                bio: None,
                role: Some(Role::Admin),
            })
            .await?;
        info!(user_id = %abbrev_uuid(&created.id), "Created initial administrator");
        Ok(created.id)
    }

    fn validate_password(&self, password: &str) -> Result<()> {
        let length = password.chars().count();
        if length < *self.password_length.start() {
            return Err(Error::BadRequest {
                message: format!("Password must be at least {} characters", self.password_length.start()),
            });
        }
        if length > *self.password_length.end() {
            return Err(Error::BadRequest {
                message: format!("Password must be no more than {} characters", self.password_length.end()),
            });
        }
        Ok(())
    }

    /// Hash the password on a blocking thread to avoid blocking async runtime
    async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        let params = self.argon2;
        tokio::task::spawn_blocking(move || password::hash_string_with_params(&password, Some(params)))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password hashing task: {e}"),
            })?
    }

    async fn verify_password(&self, password: &str, hash: String) -> Result<bool> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || password::verify_string(&password, &hash))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("spawn password verification task: {e}"),
            })
    }

    async fn dummy_hash(&self) -> Result<String> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash.clone());
        }
        let hash = self.hash_password(DUMMY_PASSWORD).await?;
        Ok(self.dummy_hash.get_or_init(|| hash).clone())
    }
}

fn validate_username(username: &str) -> Result<()> {
    if !USERNAME_LENGTH.contains(&username.chars().count()) {
        return Err(Error::BadRequest {
            message: format!(
                "Username must be between {} and {} characters",
                USERNAME_LENGTH.start(),
                USERNAME_LENGTH.end()
            ),
        });
    }
    if username.trim() != username || username.chars().any(char::is_control) {
        return Err(Error::BadRequest {
            message: "Username must not contain leading or trailing whitespace or control characters".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_identity_manager, test_stores};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_register_stores_only_hash() {
        let identity = test_identity_manager(&test_stores());
        let user = identity.register("alice", "secret1", Role::User).await.unwrap();

        assert_ne!(user.password_hash, "secret1");
        assert!(password::verify_string("secret1", &user.password_hash));
        assert_eq!(user.role, Role::User);
    }

    #[tokio::test]
    async fn test_register_honours_requested_role() {
        let identity = test_identity_manager(&test_stores());
        let user = identity.register("editor", "secret1", Role::Admin).await.unwrap();
        assert_eq!(user.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let identity = test_identity_manager(&test_stores());

        let too_long = "x".repeat(51);
        for username in ["ab", too_long.as_str(), " padded", "tab\tname"] {
            let err = identity.register(username, "secret1", Role::User).await.unwrap_err();
            assert!(matches!(err, Error::BadRequest { .. }), "{username:?} accepted");
        }

        let err = identity.register("alice", "short", Role::User).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
        let err = identity.register("alice", &"p".repeat(65), Role::User).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));

        // Boundaries are inclusive
        identity.register("abc", "secret", Role::User).await.unwrap();
        identity.register(&"y".repeat(50), &"p".repeat(64), Role::User).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_duplicate_conflicts() {
        let stores = test_stores();
        let identity = test_identity_manager(&stores);
        identity.register("bob", "secret1", Role::User).await.unwrap();

        let err = identity.register("bob", "secret2", Role::User).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert_eq!(stores.accounts.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let identity = test_identity_manager(&test_stores());
        identity.register("bob", "secret1", Role::User).await.unwrap();

        let wrong_password = identity.login("bob", "wrong").await.unwrap_err();
        let unknown_user = identity.login("nobody", "secret1").await.unwrap_err();

        assert!(matches!(wrong_password, Error::InvalidCredentials));
        assert!(matches!(unknown_user, Error::InvalidCredentials));
        assert_eq!(wrong_password.user_message(), unknown_user.user_message());
        assert_eq!(wrong_password.status_code(), unknown_user.status_code());
    }

    #[tokio::test]
    async fn test_login_resolve_logout() {
        let identity = test_identity_manager(&test_stores());
        let bob = identity.register("bob", "secret1", Role::User).await.unwrap();

        let (user, token) = identity.login("bob", "secret1").await.unwrap();
        assert_eq!(user.id, bob.id);

        match identity.resolve_current(Some(&token)).await.unwrap() {
            Identity::Authenticated(current) => {
                assert_eq!(current.id, bob.id);
                assert_eq!(current.username, "bob");
            }
            Identity::Anonymous => panic!("expected an authenticated identity"),
        }

        identity.logout(&token).await.unwrap();
        assert!(matches!(identity.resolve_current(Some(&token)).await.unwrap(), Identity::Anonymous));

        // Logging out twice is not an error
        identity.logout(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_each_login_issues_new_token() {
        let identity = test_identity_manager(&test_stores());
        identity.register("bob", "secret1", Role::User).await.unwrap();

        let (_, first) = identity.login("bob", "secret1").await.unwrap();
        let (_, second) = identity.login("bob", "secret1").await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_resolve_without_token_or_account() {
        let stores = test_stores();
        let identity = test_identity_manager(&stores);

        assert!(matches!(identity.resolve_current(None).await.unwrap(), Identity::Anonymous));

        // A live session whose account does not exist
        let orphan = stores.sessions.create(Uuid::new_v4(), Duration::from_secs(60)).await.unwrap();
        assert!(matches!(identity.resolve_current(Some(&orphan)).await.unwrap(), Identity::Anonymous));
    }

    #[tokio::test]
    async fn test_update_profile_validation_and_role_untouched() {
        let identity = test_identity_manager(&test_stores());
        let bob = identity.register("bob", "secret1", Role::User).await.unwrap();

        let err = identity
            .update_profile(
                bob.id,
                UserUpdateDBRequest {
                    bio: Some("b".repeat(501)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));

        let err = identity
            .update_profile(
                bob.id,
                UserUpdateDBRequest {
                    username: Some("b".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));

        let updated = identity
            .update_profile(
                bob.id,
                UserUpdateDBRequest {
                    bio: Some("b".repeat(500)),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.role, Role::User);
        assert_eq!(updated.password_hash, bob.password_hash);
    }

    #[tokio::test]
    async fn test_rename_to_taken_username_conflicts() {
        let identity = test_identity_manager(&test_stores());
        identity.register("alice", "secret1", Role::User).await.unwrap();
        let bob = identity.register("bob", "secret1", Role::User).await.unwrap();

        let err = identity
            .update_profile(
                bob.id,
                UserUpdateDBRequest {
                    username: Some("alice".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_creates_then_resets() {
        let stores = test_stores();
        let identity = test_identity_manager(&stores);

        let id = identity.bootstrap_admin("admin", "first-password").await.unwrap();
        let admin = stores.accounts.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        identity.login("admin", "first-password").await.unwrap();

        let again = identity.bootstrap_admin("admin", "second-password").await.unwrap();
        assert_eq!(again, id);
        assert!(matches!(
            identity.login("admin", "first-password").await.unwrap_err(),
            Error::InvalidCredentials
        ));
        identity.login("admin", "second-password").await.unwrap();
    }

    #[tokio::test]
    async fn test_bootstrap_admin_promotes_existing_user() {
        let stores = test_stores();
        let identity = test_identity_manager(&stores);
        let user = identity.register("chief", "secret1", Role::User).await.unwrap();

        identity.bootstrap_admin("chief", "secret2").await.unwrap();
        assert_eq!(stores.accounts.get_by_id(user.id).await.unwrap().unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn test_set_role() {
        let identity = test_identity_manager(&test_stores());
        let user = identity.register("writer", "secret1", Role::User).await.unwrap();

        let promoted = identity.set_role(user.id, Role::Admin).await.unwrap().unwrap();
        assert_eq!(promoted.role, Role::Admin);
        assert!(identity.set_role(Uuid::new_v4(), Role::Admin).await.unwrap().is_none());
    }
}
