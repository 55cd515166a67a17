//! Transient in-process storage backend.
//!
//! Everything lives in [`DashMap`]s and disappears with the process. The behaviour
//! matches the Postgres backend: same uniqueness rule, same constraint name in conflict
//! errors, same session keying and expiry semantics.

use std::time::Duration;

use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use tracing::instrument;
use uuid::Uuid;

use crate::api::models::users::Role;
use crate::auth::password::generate_session_token;
use crate::db::{
    errors::{DbError, Result},
    handlers::repository::{expiry_from_now, AccountStore, SessionStore},
    models::{
        sessions::{SessionRecord, SessionToken},
        users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use crate::types::{abbrev_uuid, UserId};

/// In-memory accounts.
///
/// `by_username` is the uniqueness index. A name is reserved through
/// [`DashMap::entry`] before the account becomes visible in `by_id`, so two concurrent
/// writers can never both claim it.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    by_id: DashMap<UserId, UserDBResponse>,
    by_username: DashMap<String, UserId>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl AccountStore for InMemoryAccounts {
    async fn get_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        Ok(self.by_id.get(&id).map(|r| r.value().clone()))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<UserDBResponse>> {
        // Copy the id out so the index guard is released before touching `by_id`
        let id = match self.by_username.get(username) {
            Some(r) => *r.value(),
            None => return Ok(None),
        };
        Ok(self.by_id.get(&id).map(|r| r.value().clone()))
    }

    async fn list_all(&self) -> Result<Vec<UserDBResponse>> {
        let mut users: Vec<UserDBResponse> = self.by_id.iter().map(|r| r.value().clone()).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let now = Utc::now();
        let user = UserDBResponse {
            id: Uuid::new_v4(),
            username: request.username.clone(),
            password_hash: request.password_hash.clone(),
            avatar_url: request.avatar_url.clone(),
            bio: request.bio.clone(),
            role: request.role.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        match self.by_username.entry(request.username.clone()) {
            Entry::Occupied(_) => Err(DbError::username_taken(&request.username)),
            Entry::Vacant(slot) => {
                self.by_id.insert(user.id, user.clone());
                drop(slot.insert(user.id));
                Ok(user)
            }
        }
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update_profile(&self, id: UserId, request: &UserUpdateDBRequest) -> Result<Option<UserDBResponse>> {
        let current_username = match self.by_id.get(&id) {
            Some(r) => r.value().username.clone(),
            None => return Ok(None),
        };

        // Reserve the new name first; the guard is released at the end of the match
        let mut reserved = None;
        if let Some(new_username) = request.username.as_ref().filter(|name| **name != current_username) {
            match self.by_username.entry(new_username.clone()) {
                Entry::Occupied(owner) if *owner.get() != id => return Err(DbError::username_taken(new_username)),
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    drop(slot.insert(id));
                    reserved = Some(new_username.clone());
                }
            }
        }

        let (updated, previous_username) = match self.by_id.get_mut(&id) {
            Some(mut entry) => {
                let user = entry.value_mut();
                let previous = user.username.clone();
                if let Some(username) = &request.username {
                    user.username = username.clone();
                }
                if let Some(avatar_url) = &request.avatar_url {
                    user.avatar_url = Some(avatar_url.clone());
                }
                if let Some(bio) = &request.bio {
                    user.bio = Some(bio.clone());
                }
                user.updated_at = Utc::now();
                (user.clone(), previous)
            }
            None => {
                if let Some(name) = reserved {
                    self.by_username.remove_if(&name, |_, owner| *owner == id);
                }
                return Ok(None);
            }
        };

        if previous_username != updated.username {
            self.by_username.remove_if(&previous_username, |_, owner| *owner == id);
        }

        Ok(Some(updated))
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id), role = ?role), err)]
    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<UserDBResponse>> {
        Ok(self.by_id.get_mut(&id).map(|mut entry| {
            let user = entry.value_mut();
            user.role = role;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn set_password_hash(&self, id: UserId, password_hash: &str) -> Result<bool> {
        Ok(match self.by_id.get_mut(&id) {
            Some(mut entry) => {
                let user = entry.value_mut();
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }
}

/// In-memory sessions keyed by token digest
#[derive(Debug, Default)]
pub struct InMemorySessions {
    sessions: DashMap<String, SessionRecord>,
}

impl InMemorySessions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessions {
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn create(&self, user_id: UserId, ttl: Duration) -> Result<SessionToken> {
        let token = SessionToken::new(generate_session_token());
        let record = SessionRecord {
            id: token.digest(),
            user_id,
            expires_at: expiry_from_now(ttl),
            created_at: Utc::now(),
        };
        self.sessions.insert(record.id.clone(), record);
        Ok(token)
    }

    async fn resolve(&self, token: &SessionToken) -> Result<Option<UserId>> {
        let now = Utc::now();
        Ok(self
            .sessions
            .get(&token.digest())
            .filter(|record| !record.is_expired_at(now))
            .map(|record| record.user_id))
    }

    async fn destroy(&self, token: &SessionToken) -> Result<()> {
        self.sessions.remove(&token.digest());
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut removed = 0u64;
        self.sessions.retain(|_, record| {
            let keep = !record.is_expired_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
