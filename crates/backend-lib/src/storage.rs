// ============================
// crates/backend-lib/src/storage.rs
// ============================
//! Store contracts consumed by the auth engine, plus an in-memory implementation.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use feedgate_common::{AccessToken, AuthorizationCode, Session, User, UserId};

use crate::context::Context;
use crate::error::StoreError;

/// Users and sessions
#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn insert_user(&self, ctx: &Context, user: &User) -> Result<(), StoreError>;

    async fn get_user_by_id(&self, ctx: &Context, id: UserId) -> Result<User, StoreError>;

    async fn get_user_by_email(&self, ctx: &Context, email: &str) -> Result<User, StoreError>;

    async fn get_user_by_username(&self, ctx: &Context, username: &str)
        -> Result<User, StoreError>;

    /// Overwrite a user's profile fields and `last_seen`; the password hash is untouched
    async fn update_user(&self, ctx: &Context, user: &User) -> Result<(), StoreError>;

    async fn update_user_password(
        &self,
        ctx: &Context,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), StoreError>;

    async fn delete_user(&self, ctx: &Context, id: UserId) -> Result<(), StoreError>;

    async fn insert_session(&self, ctx: &Context, session: &Session) -> Result<(), StoreError>;

    async fn get_session(&self, ctx: &Context, id: &[u8]) -> Result<Session, StoreError>;

    async fn update_session(&self, ctx: &Context, session: &Session) -> Result<(), StoreError>;

    /// `NotFound` when no row was deleted
    async fn delete_session(&self, ctx: &Context, id: &[u8]) -> Result<(), StoreError>;

    async fn get_session_and_user(
        &self,
        ctx: &Context,
        id: &[u8],
    ) -> Result<(Session, User), StoreError>;
}

/// Authorization codes and access tokens
#[async_trait]
pub trait OAuthStore: Send + Sync {
    async fn insert_auth_code(
        &self,
        ctx: &Context,
        code: &AuthorizationCode,
    ) -> Result<(), StoreError>;

    async fn get_auth_code(&self, ctx: &Context, code: &[u8])
        -> Result<AuthorizationCode, StoreError>;

    /// `NotFound` when no row was deleted. Must be atomic: of two concurrent
    /// deletes of the same code exactly one succeeds.
    async fn delete_auth_code(&self, ctx: &Context, code: &[u8]) -> Result<(), StoreError>;

    async fn insert_access_token(
        &self,
        ctx: &Context,
        token: &AccessToken,
    ) -> Result<(), StoreError>;

    async fn get_access_token_by_refresh(
        &self,
        ctx: &Context,
        refresh_token: &[u8],
    ) -> Result<AccessToken, StoreError>;

    /// `NotFound` when no row was deleted
    async fn delete_access_token(&self, ctx: &Context, token: &[u8]) -> Result<(), StoreError>;

    async fn get_access_token_and_user(
        &self,
        ctx: &Context,
        token: &[u8],
    ) -> Result<(User, AccessToken), StoreError>;
}

/// In-memory implementation of both store traits
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<DashMap<UserId, User>>,
    sessions: Arc<DashMap<Vec<u8>, Session>>,
    codes: Arc<DashMap<Vec<u8>, AuthorizationCode>>,
    tokens: Arc<DashMap<Vec<u8>, AccessToken>>,
    /// refresh token -> access token
    refresh_index: Arc<DashMap<Vec<u8>, Vec<u8>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Backend` until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn access_token_count(&self) -> usize {
        self.tokens.len()
    }

    fn check(&self, ctx: &Context) -> Result<(), StoreError> {
        if ctx.is_done() {
            return Err(StoreError::Cancelled);
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    fn find_user<F>(&self, pred: F) -> Result<User, StoreError>
    where
        F: Fn(&User) -> bool,
    {
        self.users
            .iter()
            .find(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }

    fn user(&self, id: UserId) -> Result<User, StoreError> {
        self.users
            .get(&id)
            .map(|u| u.value().clone())
            .ok_or(StoreError::NotFound)
    }
}

fn insert_unique<V: Clone>(
    map: &DashMap<Vec<u8>, V>,
    key: &[u8],
    value: &V,
) -> Result<(), StoreError> {
    match map.entry(key.to_vec()) {
        dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::Conflict),
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            slot.insert(value.clone());
            Ok(())
        },
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn insert_user(&self, ctx: &Context, user: &User) -> Result<(), StoreError> {
        self.check(ctx)?;
        let taken = self.users.iter().any(|entry| {
            let u = entry.value();
            u.id == user.id
                || u.username.eq_ignore_ascii_case(&user.username)
                || u.email.eq_ignore_ascii_case(&user.email)
        });
        if taken {
            return Err(StoreError::Conflict);
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user_by_id(&self, ctx: &Context, id: UserId) -> Result<User, StoreError> {
        self.check(ctx)?;
        self.user(id)
    }

    async fn get_user_by_email(&self, ctx: &Context, email: &str) -> Result<User, StoreError> {
        self.check(ctx)?;
        self.find_user(|u| u.email.eq_ignore_ascii_case(email))
    }

    async fn get_user_by_username(
        &self,
        ctx: &Context,
        username: &str,
    ) -> Result<User, StoreError> {
        self.check(ctx)?;
        self.find_user(|u| u.username.eq_ignore_ascii_case(username))
    }

    async fn update_user(&self, ctx: &Context, user: &User) -> Result<(), StoreError> {
        self.check(ctx)?;
        let mut existing = self.users.get_mut(&user.id).ok_or(StoreError::NotFound)?;
        let password_hash = std::mem::take(&mut existing.password_hash);
        *existing = User {
            password_hash,
            ..user.clone()
        };
        Ok(())
    }

    async fn update_user_password(
        &self,
        ctx: &Context,
        id: UserId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        self.check(ctx)?;
        let mut existing = self.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        existing.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn delete_user(&self, ctx: &Context, id: UserId) -> Result<(), StoreError> {
        self.check(ctx)?;
        self.users.remove(&id).ok_or(StoreError::NotFound)?;
        // cascade like a foreign key would
        self.sessions.retain(|_, s| s.user_id != id);
        self.codes.retain(|_, c| c.user_id != id);
        let refresh_index = &self.refresh_index;
        self.tokens.retain(|_, t| {
            if t.user_id == id {
                refresh_index.remove(&t.refresh_token);
                false
            } else {
                true
            }
        });
        Ok(())
    }

    async fn insert_session(&self, ctx: &Context, session: &Session) -> Result<(), StoreError> {
        self.check(ctx)?;
        insert_unique(&self.sessions, &session.id, session)
    }

    async fn get_session(&self, ctx: &Context, id: &[u8]) -> Result<Session, StoreError> {
        self.check(ctx)?;
        self.sessions
            .get(id)
            .map(|s| s.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn update_session(&self, ctx: &Context, session: &Session) -> Result<(), StoreError> {
        self.check(ctx)?;
        let mut existing = self.sessions.get_mut(&session.id).ok_or(StoreError::NotFound)?;
        *existing = session.clone();
        Ok(())
    }

    async fn delete_session(&self, ctx: &Context, id: &[u8]) -> Result<(), StoreError> {
        self.check(ctx)?;
        self.sessions.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn get_session_and_user(
        &self,
        ctx: &Context,
        id: &[u8],
    ) -> Result<(Session, User), StoreError> {
        self.check(ctx)?;
        let session = self
            .sessions
            .get(id)
            .map(|s| s.value().clone())
            .ok_or(StoreError::NotFound)?;
        let user = self.user(session.user_id)?;
        Ok((session, user))
    }
}

#[async_trait]
impl OAuthStore for MemoryStore {
    async fn insert_auth_code(
        &self,
        ctx: &Context,
        code: &AuthorizationCode,
    ) -> Result<(), StoreError> {
        self.check(ctx)?;
        insert_unique(&self.codes, &code.code, code)
    }

    async fn get_auth_code(
        &self,
        ctx: &Context,
        code: &[u8],
    ) -> Result<AuthorizationCode, StoreError> {
        self.check(ctx)?;
        self.codes
            .get(code)
            .map(|c| c.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn delete_auth_code(&self, ctx: &Context, code: &[u8]) -> Result<(), StoreError> {
        self.check(ctx)?;
        self.codes.remove(code).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn insert_access_token(
        &self,
        ctx: &Context,
        token: &AccessToken,
    ) -> Result<(), StoreError> {
        self.check(ctx)?;
        if self.refresh_index.contains_key(&token.refresh_token) {
            return Err(StoreError::Conflict);
        }
        insert_unique(&self.tokens, &token.token, token)?;
        self.refresh_index
            .insert(token.refresh_token.clone(), token.token.clone());
        Ok(())
    }

    async fn get_access_token_by_refresh(
        &self,
        ctx: &Context,
        refresh_token: &[u8],
    ) -> Result<AccessToken, StoreError> {
        self.check(ctx)?;
        let token = self
            .refresh_index
            .get(refresh_token)
            .map(|t| t.value().clone())
            .ok_or(StoreError::NotFound)?;
        self.tokens
            .get(&token)
            .map(|t| t.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn delete_access_token(&self, ctx: &Context, token: &[u8]) -> Result<(), StoreError> {
        self.check(ctx)?;
        let (_, row) = self.tokens.remove(token).ok_or(StoreError::NotFound)?;
        self.refresh_index.remove(&row.refresh_token);
        Ok(())
    }

    async fn get_access_token_and_user(
        &self,
        ctx: &Context,
        token: &[u8],
    ) -> Result<(User, AccessToken), StoreError> {
        self.check(ctx)?;
        let row = self
            .tokens
            .get(token)
            .map(|t| t.value().clone())
            .ok_or(StoreError::NotFound)?;
        let user = self.user(row.user_id)?;
        Ok((user, row))
    }
}

/// Build a user row the way an external registration flow would
pub fn new_user(username: &str, email: &str, password_hash: String, now: DateTime<Utc>) -> User {
    User {
        id: uuid::Uuid::new_v4(),
        email: email.to_string(),
        username: username.to_string(),
        password_hash,
        birthdate: None,
        created: now,
        last_seen: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ctx() -> Context {
        Context::background()
    }

    fn user(name: &str) -> User {
        new_user(name, &format!("{name}@example.com"), "hash".to_string(), Utc::now())
    }

    fn session(id: u8, user_id: UserId) -> Session {
        let now = Utc::now();
        Session {
            id: vec![id; 4],
            user_id,
            login_time: now,
            last_seen_time: now,
            expires: now + Duration::hours(1),
            user_agent: "test".to_string(),
        }
    }

    fn token(tag: u8, user_id: UserId) -> AccessToken {
        AccessToken {
            token: vec![tag; 4],
            auth_code: vec![0xaa; 4],
            refresh_token: vec![tag ^ 0xff; 4],
            user_id,
            created: Utc::now(),
            expires: 3600,
        }
    }

    #[tokio::test]
    async fn test_user_lookups() {
        let store = MemoryStore::new();
        let ada = user("ada");
        store.insert_user(&ctx(), &ada).await.unwrap();

        assert_eq!(store.get_user_by_id(&ctx(), ada.id).await.unwrap(), ada);
        assert_eq!(store.get_user_by_username(&ctx(), "ADA").await.unwrap().id, ada.id);
        assert_eq!(
            store.get_user_by_email(&ctx(), "ada@example.com").await.unwrap().id,
            ada.id
        );
        assert_eq!(
            store.get_user_by_username(&ctx(), "bob").await,
            Err(StoreError::NotFound)
        );
        // usernames are unique
        assert_eq!(store.insert_user(&ctx(), &user("ada")).await, Err(StoreError::Conflict));
    }

    #[tokio::test]
    async fn test_update_user_keeps_password() {
        let store = MemoryStore::new();
        let mut ada = user("ada");
        store.insert_user(&ctx(), &ada).await.unwrap();

        ada.password_hash = "ignored".to_string();
        ada.email = "ada@lovelace.org".to_string();
        store.update_user(&ctx(), &ada).await.unwrap();
        let stored = store.get_user_by_id(&ctx(), ada.id).await.unwrap();
        assert_eq!(stored.email, "ada@lovelace.org");
        assert_eq!(stored.password_hash, "hash");

        store.update_user_password(&ctx(), ada.id, "new-hash").await.unwrap();
        let stored = store.get_user_by_id(&ctx(), ada.id).await.unwrap();
        assert_eq!(stored.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn test_session_crud() {
        let store = MemoryStore::new();
        let ada = user("ada");
        store.insert_user(&ctx(), &ada).await.unwrap();
        let s = session(1, ada.id);

        store.insert_session(&ctx(), &s).await.unwrap();
        assert_eq!(store.insert_session(&ctx(), &s).await, Err(StoreError::Conflict));

        let (found, owner) = store.get_session_and_user(&ctx(), &s.id).await.unwrap();
        assert_eq!(found, s);
        assert_eq!(owner.id, ada.id);

        store.delete_session(&ctx(), &s.id).await.unwrap();
        assert_eq!(store.delete_session(&ctx(), &s.id).await, Err(StoreError::NotFound));
        assert_eq!(store.get_session(&ctx(), &s.id).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_access_token_refresh_index() {
        let store = MemoryStore::new();
        let ada = user("ada");
        store.insert_user(&ctx(), &ada).await.unwrap();
        let row = token(1, ada.id);

        store.insert_access_token(&ctx(), &row).await.unwrap();
        let by_refresh = store
            .get_access_token_by_refresh(&ctx(), &row.refresh_token)
            .await
            .unwrap();
        assert_eq!(by_refresh, row);

        store.delete_access_token(&ctx(), &row.token).await.unwrap();
        assert_eq!(
            store.get_access_token_by_refresh(&ctx(), &row.refresh_token).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let store = MemoryStore::new();
        let ada = user("ada");
        store.insert_user(&ctx(), &ada).await.unwrap();
        store.insert_session(&ctx(), &session(1, ada.id)).await.unwrap();
        store.insert_access_token(&ctx(), &token(2, ada.id)).await.unwrap();

        store.delete_user(&ctx(), ada.id).await.unwrap();
        assert_eq!(store.session_count(), 0);
        assert_eq!(store.access_token_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_and_cancelled() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.get_session(&ctx(), b"x").await,
            Err(StoreError::Backend(_))
        ));
        store.set_unavailable(false);

        let cancelled = Context::background();
        cancelled.token().cancel();
        assert_eq!(
            store.get_session(&cancelled, b"x").await,
            Err(StoreError::Cancelled)
        );
    }
}
