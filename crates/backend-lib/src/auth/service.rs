// =============
// crates/backend-lib/src/auth/service.rs
// =============
//! This module defines the `AuthService` trait, the surface a transport
//! layer calls into. Opaque keys are passed in and out text-encoded.
use async_trait::async_trait;
use feedgate_common::{AccessToken, AuthorizationCode, Session, TokenResponse, User, UserId};

use crate::context::Context;
use crate::error::AuthError;

/// A token endpoint request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequest {
    AuthorizationCode { code: String },
    RefreshToken { refresh_token: String },
}

impl TokenRequest {
    /// Build a request from the wire `grant_type` and its credential
    pub fn from_grant(grant_type: &str, credential: &str) -> Result<Self, AuthError> {
        match grant_type {
            "authorization_code" => Ok(TokenRequest::AuthorizationCode {
                code: credential.to_string(),
            }),
            "refresh_token" => Ok(TokenRequest::RefreshToken {
                refresh_token: credential.to_string(),
            }),
            other => Err(AuthError::InvalidInput(format!(
                "unsupported grant_type: {other}"
            ))),
        }
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Check credentials and open a session. Unknown users and wrong
    /// passwords fail identically with `AuthError::Credentials`.
    async fn login(
        &self,
        ctx: &Context,
        username: &str,
        password: &str,
        user_agent: &str,
        stay_logged_in: bool,
    ) -> Result<(User, Session), AuthError>;

    /// Resolve a session key to its user, renewing the session
    async fn authorize(&self, ctx: &Context, session_key: &str) -> Result<User, AuthError>;

    async fn logout(&self, ctx: &Context, session_key: &str) -> Result<(), AuthError>;

    async fn create_auth_code(
        &self,
        ctx: &Context,
        user_id: UserId,
        client_id: &str,
    ) -> Result<AuthorizationCode, AuthError>;

    async fn validate_auth_code(
        &self,
        ctx: &Context,
        code: &str,
    ) -> Result<AuthorizationCode, AuthError>;

    async fn create_access_token(
        &self,
        ctx: &Context,
        auth_code: &AuthorizationCode,
    ) -> Result<AccessToken, AuthError>;

    async fn validate_access_token(&self, ctx: &Context, token: &str) -> Result<User, AuthError>;

    async fn validate_refresh_token(
        &self,
        ctx: &Context,
        refresh_token: &str,
    ) -> Result<AccessToken, AuthError>;

    /// Run a full token endpoint exchange
    async fn exchange_token(
        &self,
        ctx: &Context,
        request: TokenRequest,
    ) -> Result<TokenResponse, AuthError>;

    async fn revoke_access_token(&self, ctx: &Context, token: &str) -> Result<(), AuthError>;

    async fn change_password(
        &self,
        ctx: &Context,
        session_key: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_from_grant() {
        assert_eq!(
            TokenRequest::from_grant("authorization_code", "abc").unwrap(),
            TokenRequest::AuthorizationCode {
                code: "abc".to_string()
            }
        );
        assert_eq!(
            TokenRequest::from_grant("refresh_token", "def").unwrap(),
            TokenRequest::RefreshToken {
                refresh_token: "def".to_string()
            }
        );
        assert!(matches!(
            TokenRequest::from_grant("client_credentials", "x"),
            Err(AuthError::InvalidInput(_))
        ));
    }
}
