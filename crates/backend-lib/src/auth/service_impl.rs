use std::sync::Arc;

use ::metrics::counter;
use async_trait::async_trait;
use feedgate_common::{AccessToken, AuthorizationCode, Session, TokenResponse, User, UserId};
use tracing::{info, instrument, warn};
use zeroize::Zeroizing;

use super::oauth::OAuthGrantEngine;
use super::password::{validate_password_strength, CredentialVerifier};
use super::rate_limit::AuthRateLimiter;
use super::service::{AuthService, TokenRequest};
use super::session::SessionManager;
use super::token_generator::{decode_key, encode_key};
use crate::config::{PasswordRequirements, Settings};
use crate::context::Context;
use crate::error::{AuthError, StoreError};
use crate::metrics::{LOGIN_FAILED, LOGIN_LOCKED_OUT};
use crate::storage::{AuthStore, OAuthStore};

/// `token_type` of every issued access token
pub const TOKEN_TYPE: &str = "bearer";

/// The production [`AuthService`]
pub struct DefaultAuth {
    users: Arc<dyn AuthStore>,
    verifier: CredentialVerifier,
    sessions: SessionManager,
    grants: OAuthGrantEngine,
    limiter: AuthRateLimiter,
    requirements: PasswordRequirements,
}

impl DefaultAuth {
    /// Build the service over one store that implements both contracts
    pub fn new<S>(store: Arc<S>, settings: &Settings) -> Result<Self, AuthError>
    where
        S: AuthStore + OAuthStore + 'static,
    {
        Self::from_parts(
            store.clone(),
            store,
            settings,
            AuthRateLimiter::from_settings(&settings.rate_limit),
        )
    }

    /// Build the service from separately owned components
    pub fn from_parts(
        auth_store: Arc<dyn AuthStore>,
        oauth_store: Arc<dyn OAuthStore>,
        settings: &Settings,
        limiter: AuthRateLimiter,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            verifier: CredentialVerifier::new(&settings.password)?,
            sessions: SessionManager::new(auth_store.clone(), settings.session.clone()),
            grants: OAuthGrantEngine::new(oauth_store, settings.oauth.clone()),
            users: auth_store,
            limiter,
            requirements: settings.password.requirements.clone(),
        })
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn grants(&self) -> &OAuthGrantEngine {
        &self.grants
    }

    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    /// scrypt is CPU-bound, keep it off the async workers
    async fn verify_off_thread(&self, hash: Option<String>, password: &str) -> Result<bool, AuthError> {
        let verifier = self.verifier.clone();
        let password = Zeroizing::new(password.to_string());
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => verifier.verify(&hash, &password),
            None => {
                verifier.verify_dummy(&password);
                false
            },
        })
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))
    }

    async fn hash_off_thread(&self, password: &str) -> Result<String, AuthError> {
        let verifier = self.verifier.clone();
        let mut password = password.to_string();
        tokio::task::spawn_blocking(move || verifier.hash_secure(&mut password))
            .await
            .map_err(|e| AuthError::Hash(e.to_string()))?
    }

    fn reject_login(&self, username: &str) -> AuthError {
        counter!(LOGIN_FAILED).increment(1);
        if self.limiter.record_failed_attempt(username) {
            counter!(LOGIN_LOCKED_OUT).increment(1);
            warn!("login locked out after repeated failures");
        } else {
            warn!("login rejected");
        }
        AuthError::Credentials
    }

    fn token_response(&self, token: &AccessToken) -> TokenResponse {
        TokenResponse {
            access_token: encode_key(&token.token),
            token_type: TOKEN_TYPE.to_string(),
            expires_in: token.expires,
            refresh_token: encode_key(&token.refresh_token),
            scope: self.grants.settings().default_scope.clone(),
        }
    }
}

#[async_trait]
impl AuthService for DefaultAuth {
    #[instrument(skip_all)]
    async fn login(
        &self,
        ctx: &Context,
        username: &str,
        password: &str,
        user_agent: &str,
        stay_logged_in: bool,
    ) -> Result<(User, Session), AuthError> {
        if !self.limiter.check_rate_limit(username) {
            counter!(LOGIN_LOCKED_OUT).increment(1);
            warn!("login attempted while locked out");
            return Err(AuthError::AuthRateLimited);
        }

        let user = match ctx.run(self.users.get_user_by_username(ctx, username)).await {
            Ok(user) => Some(user),
            Err(StoreError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        let verified = self
            .verify_off_thread(user.as_ref().map(|u| u.password_hash.clone()), password)
            .await?;

        let user = match user {
            Some(user) if verified => user,
            _ => return Err(self.reject_login(username)),
        };
        self.limiter.record_success(username);

        let session = self
            .sessions
            .create_session(ctx, user.id, user_agent, stay_logged_in)
            .await?;
        info!(user_id = %user.id, stay_logged_in, "login succeeded");
        Ok((user, session))
    }

    #[instrument(skip_all)]
    async fn authorize(&self, ctx: &Context, session_key: &str) -> Result<User, AuthError> {
        let key = decode_key(session_key)?;
        self.sessions.validate_session(ctx, &key).await
    }

    #[instrument(skip_all)]
    async fn logout(&self, ctx: &Context, session_key: &str) -> Result<(), AuthError> {
        let key = decode_key(session_key)?;
        self.sessions.delete_session(ctx, &key).await?;
        info!("logged out");
        Ok(())
    }

    async fn create_auth_code(
        &self,
        ctx: &Context,
        user_id: UserId,
        client_id: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        self.grants.create_auth_code(ctx, user_id, client_id).await
    }

    async fn validate_auth_code(
        &self,
        ctx: &Context,
        code: &str,
    ) -> Result<AuthorizationCode, AuthError> {
        self.grants.validate_auth_code(ctx, code).await
    }

    async fn create_access_token(
        &self,
        ctx: &Context,
        auth_code: &AuthorizationCode,
    ) -> Result<AccessToken, AuthError> {
        self.grants.create_access_token(ctx, auth_code).await
    }

    async fn validate_access_token(&self, ctx: &Context, token: &str) -> Result<User, AuthError> {
        self.grants.validate_access_token(ctx, token).await
    }

    async fn validate_refresh_token(
        &self,
        ctx: &Context,
        refresh_token: &str,
    ) -> Result<AccessToken, AuthError> {
        self.grants.validate_refresh_token(ctx, refresh_token).await
    }

    #[instrument(skip_all)]
    async fn exchange_token(
        &self,
        ctx: &Context,
        request: TokenRequest,
    ) -> Result<TokenResponse, AuthError> {
        let token = match request {
            TokenRequest::AuthorizationCode { code } => {
                let code = self.grants.validate_auth_code(ctx, &code).await?;
                self.grants.consume_auth_code(ctx, &code).await?;
                self.grants.create_access_token(ctx, &code).await?
            },
            TokenRequest::RefreshToken { refresh_token } => {
                let previous = self.grants.validate_refresh_token(ctx, &refresh_token).await?;
                self.grants.refresh_access_token(ctx, &previous).await?
            },
        };
        Ok(self.token_response(&token))
    }

    async fn revoke_access_token(&self, ctx: &Context, token: &str) -> Result<(), AuthError> {
        self.grants.revoke_access_token(ctx, token).await
    }

    #[instrument(skip_all)]
    async fn change_password(
        &self,
        ctx: &Context,
        session_key: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let user = self.authorize(ctx, session_key).await?;
        if !self.limiter.check_rate_limit(&user.username) {
            counter!(LOGIN_LOCKED_OUT).increment(1);
            warn!(user_id = %user.id, "password change attempted while locked out");
            return Err(AuthError::AuthRateLimited);
        }

        if !self
            .verify_off_thread(Some(user.password_hash.clone()), current_password)
            .await?
        {
            return Err(self.reject_login(&user.username));
        }
        self.limiter.record_success(&user.username);
        if !validate_password_strength(new_password, &self.requirements) {
            return Err(AuthError::InvalidInput(
                "password does not meet complexity requirements".to_string(),
            ));
        }

        let hash = self.hash_off_thread(new_password).await?;
        ctx.check()?;
        ctx.run(self.users.update_user_password(ctx, user.id, &hash))
            .await
            .map_err(|e| AuthError::from_lookup(e, AuthError::UserNotFound))?;
        info!(user_id = %user.id, "password changed");
        Ok(())
    }
}
