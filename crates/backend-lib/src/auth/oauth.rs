// ============================
// crates/backend-lib/src/auth/oauth.rs
// ============================
//! Authorization-code grant: codes, access tokens and refresh tokens.
//!
//! ```text
//! session --create_auth_code--> code --exchange--> access + refresh token
//! refresh token --refresh_access_token--> fresh access + refresh token
//! ```
//!
//! Codes are single-use and short-lived. Access tokens expire `expires`
//! seconds after `created` and are never renewed in place; clients come back
//! with the refresh token instead.
use std::sync::Arc;

use ::metrics::counter;
use chrono::{Duration, Utc};
use feedgate_common::{AccessToken, AuthorizationCode, User, UserId};
use tracing::{debug, info, warn};

use super::token_generator::{decode_key, generate_key};
use crate::config::OAuthSettings;
use crate::context::Context;
use crate::error::{AuthError, StoreError};
use crate::metrics::{
    ACCESS_TOKEN_ISSUED, ACCESS_TOKEN_REFRESHED, ACCESS_TOKEN_REVOKED, AUTH_CODE_CONSUMED,
    AUTH_CODE_EXPIRED, AUTH_CODE_ISSUED,
};
use crate::storage::OAuthStore;

/// Issues and validates authorization codes and token pairs
#[derive(Clone)]
pub struct OAuthGrantEngine {
    store: Arc<dyn OAuthStore>,
    settings: OAuthSettings,
}

impl OAuthGrantEngine {
    pub fn new(store: Arc<dyn OAuthStore>, settings: OAuthSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Issue an authorization code for `client_id` acting on behalf of `user_id`
    pub async fn create_auth_code(
        &self,
        ctx: &Context,
        user_id: UserId,
        client_id: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        if client_id.trim().is_empty() {
            return Err(AuthError::InvalidInput("client_id must not be empty".to_string()));
        }
        let ttl = Duration::from_std(std::time::Duration::from_secs(self.settings.code_ttl_secs))
            .map_err(|_| AuthError::InvalidInput("code ttl out of range".to_string()))?;
        let code = AuthorizationCode {
            code: generate_key(self.settings.code_bytes)?,
            client_id: client_id.to_string(),
            user_id,
            scope: self.settings.default_scope.clone(),
            expires: Utc::now()
                .checked_add_signed(ttl)
                .ok_or_else(|| AuthError::InvalidInput("code ttl out of range".to_string()))?,
        };

        ctx.check()?;
        ctx.run(self.store.insert_auth_code(ctx, &code)).await?;

        counter!(AUTH_CODE_ISSUED).increment(1);
        info!(user_id = %user_id, client_id, "authorization code issued");
        Ok(code)
    }

    /// Look up an encoded authorization code. Expired codes are deleted and rejected.
    pub async fn validate_auth_code(
        &self,
        ctx: &Context,
        encoded_code: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        let raw = decode_key(encoded_code)?;
        let code = ctx
            .run(self.store.get_auth_code(ctx, &raw))
            .await
            .map_err(|e| AuthError::from_lookup(e, AuthError::CodeNotFound))?;

        if code.is_expired(Utc::now()) {
            counter!(AUTH_CODE_EXPIRED).increment(1);
            warn!(user_id = %code.user_id, client_id = %code.client_id, "expired authorization code presented");
            if !ctx.is_done() {
                match ctx.run(self.store.delete_auth_code(ctx, &raw)).await {
                    Ok(()) | Err(StoreError::NotFound) => {},
                    Err(e) => warn!(error = %e, "failed to purge expired authorization code"),
                }
            }
            return Err(AuthError::CodeExpired);
        }
        Ok(code)
    }

    /// Remove a validated code so it cannot be exchanged again. When the row
    /// is already gone another exchange got there first.
    pub async fn consume_auth_code(
        &self,
        ctx: &Context,
        code: &AuthorizationCode,
    ) -> Result<(), AuthError> {
        ctx.check()?;
        ctx.run(self.store.delete_auth_code(ctx, &code.code))
            .await
            .map_err(|e| AuthError::from_lookup(e, AuthError::CodeNotFound))?;
        counter!(AUTH_CODE_CONSUMED).increment(1);
        debug!(user_id = %code.user_id, client_id = %code.client_id, "authorization code consumed");
        Ok(())
    }

    /// Mint a token pair for an already validated code. The code is not
    /// checked again here.
    pub async fn create_access_token(
        &self,
        ctx: &Context,
        auth_code: &AuthorizationCode,
    ) -> Result<AccessToken, AuthError> {
        let token = self.mint(ctx, &auth_code.code, auth_code.user_id).await?;
        counter!(ACCESS_TOKEN_ISSUED).increment(1);
        info!(user_id = %auth_code.user_id, client_id = %auth_code.client_id, "access token issued");
        Ok(token)
    }

    /// Resolve an encoded access token to the user it was issued for
    pub async fn validate_access_token(
        &self,
        ctx: &Context,
        encoded_token: &str,
    ) -> Result<User, AuthError> {
        let raw = decode_key(encoded_token)?;
        let (user, token) = ctx
            .run(self.store.get_access_token_and_user(ctx, &raw))
            .await
            .map_err(|e| AuthError::from_lookup(e, AuthError::TokenNotFound))?;

        if token.is_expired(Utc::now()) {
            debug!(user_id = %user.id, "expired access token presented");
            return Err(AuthError::TokenExpired);
        }
        Ok(user)
    }

    /// Resolve an encoded refresh token to its access-token row. The paired
    /// access token may well have expired; that does not matter here.
    pub async fn validate_refresh_token(
        &self,
        ctx: &Context,
        encoded_refresh_token: &str,
    ) -> Result<AccessToken, AuthError> {
        let raw = decode_key(encoded_refresh_token)?;
        ctx.run(self.store.get_access_token_by_refresh(ctx, &raw))
            .await
            .map_err(|e| AuthError::from_lookup(e, AuthError::RefreshTokenNotFound))
    }

    /// Mint a new pair bound to the same authorization code and user as
    /// `previous`. With rotation enabled the previous row is deleted, which
    /// retires its refresh token.
    pub async fn refresh_access_token(
        &self,
        ctx: &Context,
        previous: &AccessToken,
    ) -> Result<AccessToken, AuthError> {
        let token = self.mint(ctx, &previous.auth_code, previous.user_id).await?;

        if self.settings.rotate_refresh_tokens {
            match ctx.run(self.store.delete_access_token(ctx, &previous.token)).await {
                Ok(()) => {},
                // a concurrent refresh already retired it; undo ours
                Err(StoreError::NotFound) => {
                    if let Err(e) = ctx.run(self.store.delete_access_token(ctx, &token.token)).await {
                        warn!(user_id = %previous.user_id, error = %e, "failed to withdraw token minted by a losing refresh");
                    }
                    return Err(AuthError::RefreshTokenNotFound);
                },
                Err(e) => return Err(e.into()),
            }
        }

        counter!(ACCESS_TOKEN_REFRESHED).increment(1);
        info!(user_id = %previous.user_id, rotated = self.settings.rotate_refresh_tokens, "access token refreshed");
        Ok(token)
    }

    /// Delete an access token row and its refresh token. Idempotent.
    pub async fn revoke_access_token(
        &self,
        ctx: &Context,
        encoded_token: &str,
    ) -> Result<(), AuthError> {
        let raw = decode_key(encoded_token)?;
        ctx.check()?;
        match ctx.run(self.store.delete_access_token(ctx, &raw)).await {
            Ok(()) => {
                counter!(ACCESS_TOKEN_REVOKED).increment(1);
                Ok(())
            },
            Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn mint(
        &self,
        ctx: &Context,
        auth_code: &[u8],
        user_id: UserId,
    ) -> Result<AccessToken, AuthError> {
        let token = AccessToken {
            token: generate_key(self.settings.token_bytes)?,
            auth_code: auth_code.to_vec(),
            refresh_token: generate_key(self.settings.token_bytes)?,
            user_id,
            created: Utc::now(),
            expires: self.settings.access_token_ttl_secs,
        };
        ctx.check()?;
        ctx.run(self.store.insert_access_token(ctx, &token)).await?;
        Ok(token)
    }
}
