// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Authentication: sessions, credentials and the authorization-code grant.

pub mod oauth;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod token_generator;
mod service;
mod service_impl;

pub use oauth::OAuthGrantEngine;
pub use password::{validate_password_strength, verify_password, CredentialVerifier, MIN_PASSWORD_LENGTH};
pub use rate_limit::AuthRateLimiter;
pub use service::{AuthService, TokenRequest};
pub use service_impl::{DefaultAuth, TOKEN_TYPE};
pub use session::{SessionManager, UNKNOWN_USER_AGENT};
pub use token_generator::{decode_key, encode_key, generate_key};
