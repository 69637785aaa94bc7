// ============================
// crates/backend-lib/src/auth/session.rs
// ============================
//! Session creation, sliding renewal and deletion.
use std::sync::Arc;

use ::metrics::counter;
use chrono::{Duration, Utc};
use feedgate_common::{Session, User, UserId};
use tracing::{debug, warn};

use super::token_generator::generate_key;
use crate::config::SessionSettings;
use crate::context::Context;
use crate::error::{AuthError, StoreError};
use crate::metrics::{SESSION_CREATED, SESSION_DELETED, SESSION_EXPIRED};
use crate::storage::AuthStore;

/// User agent recorded when the client sends none
pub const UNKNOWN_USER_AGENT: &str = "unknown";

/// Session manager backed by an [`AuthStore`]
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn AuthStore>,
    settings: SessionSettings,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(store: Arc<dyn AuthStore>, settings: SessionSettings) -> Self {
        Self { store, settings }
    }

    /// Create and persist a new session for `user_id`
    pub async fn create_session(
        &self,
        ctx: &Context,
        user_id: UserId,
        user_agent: &str,
        stay_logged_in: bool,
    ) -> Result<Session, AuthError> {
        let ttl = Duration::from_std(self.settings.ttl(stay_logged_in))
            .map_err(|_| AuthError::InvalidInput("session ttl out of range".to_string()))?;
        let id = generate_key(self.settings.key_bytes)?;
        let now = Utc::now();
        let user_agent = if user_agent.trim().is_empty() {
            UNKNOWN_USER_AGENT.to_string()
        } else {
            user_agent.to_string()
        };
        let session = Session {
            id,
            user_id,
            login_time: now,
            last_seen_time: now,
            expires: now
                .checked_add_signed(ttl)
                .ok_or_else(|| AuthError::InvalidInput("session ttl out of range".to_string()))?,
            user_agent,
        };

        ctx.check()?;
        ctx.run(self.store.insert_session(ctx, &session)).await?;

        counter!(SESSION_CREATED).increment(1);
        debug!(user_id = %user_id, stay_logged_in, "session created");
        Ok(session)
    }

    /// Validate a session key and return the owning user.
    ///
    /// Expired sessions are deleted on discovery. Live sessions have their
    /// deadline pushed forward by the time elapsed since they were last seen.
    pub async fn validate_session(&self, ctx: &Context, key: &[u8]) -> Result<User, AuthError> {
        let mut session = ctx
            .run(self.store.get_session(ctx, key))
            .await
            .map_err(|e| AuthError::from_lookup(e, AuthError::SessionNotFound))?;

        let now = Utc::now();
        if session.is_expired(now) {
            self.purge_expired(ctx, &session).await;
            return Err(AuthError::SessionExpired);
        }

        // a clock stepping backwards must not pull the deadline in
        let elapsed = now - session.last_seen_time;
        if elapsed > Duration::zero() {
            if let Some(extended) = session.expires.checked_add_signed(elapsed) {
                session.expires = extended;
            }
        }
        session.last_seen_time = now;

        ctx.check()?;
        let (_, mut user) = tokio::try_join!(
            async {
                ctx.run(self.store.update_session(ctx, &session))
                    .await
                    .map_err(AuthError::from)
            },
            async {
                ctx.run(self.store.get_user_by_id(ctx, session.user_id))
                    .await
                    .map_err(AuthError::from)
            },
        )?;

        user.last_seen = now;
        ctx.run(self.store.update_user(ctx, &user)).await?;

        debug!(user_id = %user.id, expires = %session.expires, "session renewed");
        Ok(user)
    }

    /// Fetch a session without renewing it
    pub async fn get_session(&self, ctx: &Context, key: &[u8]) -> Result<Session, AuthError> {
        ctx.run(self.store.get_session(ctx, key))
            .await
            .map_err(|e| AuthError::from_lookup(e, AuthError::SessionNotFound))
    }

    /// Delete a session. Deleting a session that does not exist is not an error.
    pub async fn delete_session(&self, ctx: &Context, key: &[u8]) -> Result<(), AuthError> {
        ctx.check()?;
        match ctx.run(self.store.delete_session(ctx, key)).await {
            Ok(()) => {
                counter!(SESSION_DELETED).increment(1);
                Ok(())
            },
            Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn purge_expired(&self, ctx: &Context, session: &Session) {
        counter!(SESSION_EXPIRED).increment(1);
        warn!(user_id = %session.user_id, expired_at = %session.expires, "expired session purged");
        if ctx.is_done() {
            return;
        }
        match ctx.run(self.store.delete_session(ctx, &session.id)).await {
            Ok(()) | Err(StoreError::NotFound) => {},
            Err(e) => warn!(user_id = %session.user_id, error = %e, "failed to purge expired session"),
        }
    }
}
