// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Session and OAuth2-style token lifecycle engine for `feedgate`.
//!
//! Everything a transport layer needs goes through [`AuthService`]; the
//! persistence layer plugs in behind [`AuthStore`] and [`OAuthStore`].

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod storage;

use std::sync::Arc;

pub use crate::auth::{AuthService, DefaultAuth, TokenRequest};
pub use crate::context::Context;
pub use crate::error::{AuthError, ErrorKind, StoreError};
pub use crate::storage::{AuthStore, MemoryStore, OAuthStore};
pub use feedgate_common::{AccessToken, AuthorizationCode, Session, TokenResponse, User, UserId};

use crate::config::Settings;

/// Shared state handed to a transport layer
#[derive(Clone)]
pub struct AppState {
    /// Authentication service
    pub auth: Arc<dyn AuthService>,
    /// Settings the service was built with
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the default service over a store implementing both contracts
    pub fn new<S>(store: Arc<S>, settings: Settings) -> Result<Self, AuthError>
    where
        S: AuthStore + OAuthStore + 'static,
    {
        let auth = Arc::new(DefaultAuth::new(store, &settings)?);
        Ok(Self {
            auth,
            settings: Arc::new(settings),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PasswordSettings;

    #[tokio::test]
    async fn test_app_state_wires_service() {
        let settings = Settings {
            password: PasswordSettings::low_cost(),
            ..Settings::default()
        };
        let store = Arc::new(MemoryStore::new());
        let user = storage::new_user("ada", "ada@example.com", "hash".to_string(), chrono::Utc::now());
        store.insert_user(&Context::background(), &user).await.unwrap();

        let state = AppState::new(store, settings).unwrap();
        let code = state
            .auth
            .create_auth_code(&Context::background(), user.id, "reader-app")
            .await
            .unwrap();
        assert_eq!(code.scope, state.settings.oauth.default_scope);
    }
}
