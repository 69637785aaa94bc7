// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_EXPIRED: &str = "session.expired";
pub const SESSION_DELETED: &str = "session.deleted";
pub const LOGIN_FAILED: &str = "login.failed";
pub const LOGIN_LOCKED_OUT: &str = "login.locked_out";
pub const AUTH_CODE_ISSUED: &str = "oauth.code.issued";
pub const AUTH_CODE_CONSUMED: &str = "oauth.code.consumed";
pub const AUTH_CODE_EXPIRED: &str = "oauth.code.expired";
pub const ACCESS_TOKEN_ISSUED: &str = "oauth.token.issued";
pub const ACCESS_TOKEN_REFRESHED: &str = "oauth.token.refreshed";
pub const ACCESS_TOKEN_REVOKED: &str = "oauth.token.revoked";
