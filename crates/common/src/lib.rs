// ================
// common/src/lib.rs
// ================
//! Common types shared between the `feedgate` auth engine, its stores and
//! the transport layer in front of it.
//! Opaque identifiers are kept as raw bytes here; the text encoding used on
//! the wire lives with the key generator in `feedgate-auth`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a user row
pub type UserId = Uuid;

/// A registered user, owned by the store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
    /// PHC-formatted password hash
    pub password_hash: String,
    pub birthdate: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    /// Bumped every time one of the user's sessions is validated
    pub last_seen: DateTime<Utc>,
}

/// A bearer session created at login
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Random key, doubles as the bearer token
    pub id: Vec<u8>,
    pub user_id: UserId,
    pub login_time: DateTime<Utc>,
    pub last_seen_time: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub user_agent: String,
}

impl Session {
    /// Whether the session deadline has passed at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires < now
    }
}

/// A short-lived, single-use grant issued at the authorize step
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: Vec<u8>,
    pub client_id: String,
    pub user_id: UserId,
    pub scope: String,
    pub expires: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires < now
    }
}

/// An access token row. `expires` is a lifetime in seconds relative to `created`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: Vec<u8>,
    /// The authorization code this grant descends from
    pub auth_code: Vec<u8>,
    pub refresh_token: Vec<u8>,
    pub user_id: UserId,
    pub created: DateTime<Utc>,
    pub expires: i64,
}

impl AccessToken {
    /// Absolute deadline of the access token, `None` if it is not representable
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        Duration::try_seconds(self.expires).and_then(|ttl| self.created.checked_add_signed(ttl))
    }

    /// Valid while `created + expires > now`. An unrepresentable deadline counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline().map_or(true, |deadline| deadline <= now)
    }
}

/// Token endpoint response, every token text-encoded
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
    pub refresh_token: String,
    pub scope: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(created: DateTime<Utc>, expires: i64) -> AccessToken {
        AccessToken {
            token: vec![1],
            auth_code: vec![2],
            refresh_token: vec![3],
            user_id: Uuid::new_v4(),
            created,
            expires,
        }
    }

    #[test]
    fn test_access_token_deadline() {
        let now = Utc::now();
        assert!(!token(now, 3600).is_expired(now));
        assert!(token(now - Duration::seconds(3601), 3600).is_expired(now));
        // exactly at the deadline the token is no longer valid
        assert!(token(now - Duration::seconds(3600), 3600).is_expired(now));
    }

    #[test]
    fn test_out_of_range_lifetime_is_expired() {
        let now = Utc::now();
        assert_eq!(token(now, 100_000_000_000_000_000).deadline(), None);
        assert!(token(now, 100_000_000_000_000_000).is_expired(now));
        assert!(token(now, i64::MIN).is_expired(now));
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = Session {
            id: vec![0; 8],
            user_id: Uuid::new_v4(),
            login_time: now,
            last_seen_time: now,
            expires: now - Duration::minutes(1),
            user_agent: "unknown".to_string(),
        };
        assert!(session.is_expired(now));
        assert!(!session.is_expired(now - Duration::minutes(2)));
    }

    #[test]
    fn test_token_response_wire_names() {
        let response = TokenResponse {
            access_token: "YWJj".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 3600,
            refresh_token: "ZGVm".to_string(),
            scope: "all".to_string(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["access_token"], "YWJj");
        assert_eq!(json["token_type"], "bearer");
        assert_eq!(json["expires_in"], 3600);
        assert_eq!(json["refresh_token"], "ZGVm");
    }
}
