//! PostgreSQL account store.

use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::types::{abbrev_uuid, UserId};
use crate::{
    api::models::users::Role,
    db::{
        errors::Result,
        handlers::repository::AccountStore,
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};

const USER_COLUMNS: &str = "id, username, password_hash, avatar_url, bio, role, created_at, updated_at";

/// Accounts persisted in the `users` table. Username uniqueness is the
/// `users_username_key` constraint.
#[derive(Debug, Clone)]
pub struct PgAccounts {
    db: PgPool,
}

impl PgAccounts {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl AccountStore for PgAccounts {
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn get_by_username(&self, username: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn list_all(&self) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, UserDBResponse>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC, id ASC"))
            .fetch_all(&self.db)
            .await?;
        Ok(users)
    }

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        // Always generate a new ID for users
        let user_id = Uuid::new_v4();

        let user = sqlx::query_as::<_, UserDBResponse>(&format!(
            r#"
            INSERT INTO users (id, username, password_hash, avatar_url, bio, role)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, 'user'::user_role))
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(&request.username)
        .bind(&request.password_hash)
        .bind(&request.avatar_url)
        .bind(&request.bio)
        .bind(request.role)
        .fetch_one(&self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update_profile(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<Option<UserDBResponse>> {
        // Atomic update with conditional field updates
        let user = sqlx::query_as::<_, UserDBResponse>(&format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                avatar_url = COALESCE($3, avatar_url),
                bio = COALESCE($4, bio),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&request.username)
        .bind(&request.avatar_url)
        .bind(&request.bio)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id), role = ?role), err)]
    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>(&format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(all(test, feature = "postgres-tests"))]
mod tests {
    use super::*;
    use crate::db::errors::DbError;

    fn create_request(username: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            username: username.to_string(),
            password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdA$aGFzaA".to_string(),
            avatar_url: None,
            bio: Some("Writes about compilers".to_string()),
            role: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user(pool: PgPool) {
        let repo = PgAccounts::new(pool);

        let user = repo.create(&create_request("testuser")).await.unwrap();
        assert_eq!(user.username, "testuser");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.bio.as_deref(), Some("Writes about compilers"));

        let found = repo.get_by_username("testuser").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(repo.get_by_id(user.id).await.unwrap().unwrap().username, "testuser");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_admin_user(pool: PgPool) {
        let repo = PgAccounts::new(pool);
        let mut request = create_request("editor");
        request.role = Some(Role::Admin);

        let user = repo.create(&request).await.unwrap();
        assert_eq!(user.role, Role::Admin);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_username_is_unique_violation(pool: PgPool) {
        let repo = PgAccounts::new(pool);
        repo.create(&create_request("dupe")).await.unwrap();

        let err = repo.create(&create_request("dupe")).await.unwrap_err();
        assert!(err.is_username_conflict(), "unexpected error: {err:?}");
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_profile_keeps_role_and_password(pool: PgPool) {
        let repo = PgAccounts::new(pool);
        let user = repo.create(&create_request("profile")).await.unwrap();

        let updated = repo
            .update_profile(
                user.id,
                &UserUpdateDBRequest {
                    username: Some("renamed".to_string()),
                    avatar_url: Some("uploads/a.png".to_string()),
                    bio: None,
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.username, "renamed");
        assert_eq!(updated.avatar_url.as_deref(), Some("uploads/a.png"));
        assert_eq!(updated.bio, user.bio);
        assert_eq!(updated.role, Role::User);
        assert_eq!(updated.password_hash, user.password_hash);

        assert!(
            repo.update_profile(Uuid::new_v4(), &UserUpdateDBRequest::default())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_rename_to_taken_username_conflicts(pool: PgPool) {
        let repo = PgAccounts::new(pool);
        let alice = repo.create(&create_request("alice")).await.unwrap();
        repo.create(&create_request("bob")).await.unwrap();

        let err = repo
            .update_profile(
                alice.id,
                &UserUpdateDBRequest {
                    username: Some("bob".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_username_conflict());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_set_role_and_password_hash(pool: PgPool) {
        let repo = PgAccounts::new(pool);
        let user = repo.create(&create_request("promote")).await.unwrap();

        let promoted = repo.set_role(user.id, Role::Admin).await.unwrap().unwrap();
        assert_eq!(promoted.role, Role::Admin);

        assert!(repo.set_password_hash(user.id, "replacement").await.unwrap());
        assert_eq!(repo.get_by_id(user.id).await.unwrap().unwrap().password_hash, "replacement");
        assert!(!repo.set_password_hash(Uuid::new_v4(), "replacement").await.unwrap());
    }
}
