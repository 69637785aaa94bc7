// crates/backend-lib/src/error.rs

//! Central error types for the auth engine and its store contract.
use thiserror::Error;

/// Failure reported by an [`AuthStore`](crate::storage::AuthStore) or
/// [`OAuthStore`](crate::storage::OAuthStore) implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("duplicate key")]
    Conflict,

    #[error("store operation cancelled")]
    Cancelled,

    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Coarse classification a transport layer maps to its own status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Expired,
    Invalid,
    Credential,
    RateLimited,
    Cancelled,
    Store,
    Internal,
}

/// Errors returned by every auth operation
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid username or password")]
    Credentials,

    #[error("Authentication rate limit exceeded")]
    AuthRateLimited,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Session expired")]
    SessionExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Authorization code not found")]
    CodeNotFound,

    #[error("Authorization code expired")]
    CodeExpired,

    #[error("Access token not found")]
    TokenNotFound,

    #[error("Access token expired")]
    TokenExpired,

    #[error("Refresh token not found")]
    RefreshTokenNotFound,

    #[error("Malformed key")]
    MalformedKey,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Entropy source unavailable: {0}")]
    Entropy(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => AuthError::Cancelled,
            other => AuthError::Store(other),
        }
    }
}

impl AuthError {
    /// Classify the error for the transport layer
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Credentials => ErrorKind::Credential,
            AuthError::AuthRateLimited => ErrorKind::RateLimited,
            AuthError::SessionNotFound
            | AuthError::UserNotFound
            | AuthError::CodeNotFound
            | AuthError::TokenNotFound
            | AuthError::RefreshTokenNotFound => ErrorKind::NotFound,
            AuthError::SessionExpired | AuthError::CodeExpired | AuthError::TokenExpired => {
                ErrorKind::Expired
            },
            AuthError::MalformedKey | AuthError::InvalidInput(_) => ErrorKind::Invalid,
            AuthError::Cancelled | AuthError::Store(StoreError::Cancelled) => ErrorKind::Cancelled,
            AuthError::Store(_) => ErrorKind::Store,
            AuthError::Entropy(_) | AuthError::Hash(_) => ErrorKind::Internal,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Credentials => "AUTH_001",
            AuthError::AuthRateLimited => "AUTH_002",
            AuthError::SessionNotFound => "SESS_001",
            AuthError::SessionExpired => "SESS_002",
            AuthError::UserNotFound => "USER_001",
            AuthError::CodeNotFound => "CODE_001",
            AuthError::CodeExpired => "CODE_002",
            AuthError::TokenNotFound => "TOKEN_001",
            AuthError::TokenExpired => "TOKEN_002",
            AuthError::RefreshTokenNotFound => "TOKEN_003",
            AuthError::MalformedKey => "VAL_001",
            AuthError::InvalidInput(_) => "VAL_002",
            AuthError::Cancelled => "CANCEL_001",
            AuthError::Entropy(_) => "INT_001",
            AuthError::Hash(_) => "INT_002",
            AuthError::Store(_) => "STORE_001",
        }
    }

    /// Get a sanitized message suitable for returning to clients
    pub fn sanitized_message(&self) -> String {
        match self.kind() {
            ErrorKind::Credential => "Authentication failed".to_string(),
            ErrorKind::RateLimited => {
                "Too many authentication attempts, please try again later".to_string()
            },
            ErrorKind::NotFound => "Resource not found".to_string(),
            ErrorKind::Expired => "Credential expired".to_string(),
            ErrorKind::Invalid => "Invalid input provided".to_string(),
            ErrorKind::Cancelled => "Request cancelled".to_string(),
            ErrorKind::Store | ErrorKind::Internal => {
                "An internal server error occurred".to_string()
            },
        }
    }

    /// Translate a store `NotFound` into the domain-specific variant
    pub(crate) fn from_lookup(err: StoreError, not_found: AuthError) -> AuthError {
        match err {
            StoreError::NotFound => not_found,
            other => other.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::Credentials.to_string(),
            "Invalid username or password"
        );
        let store = AuthError::Store(StoreError::Backend("connection reset".to_string()));
        assert!(store.to_string().contains("connection reset"));
    }

    #[test]
    fn test_auth_error_kinds() {
        assert_eq!(AuthError::SessionNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(AuthError::RefreshTokenNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(AuthError::CodeExpired.kind(), ErrorKind::Expired);
        assert_eq!(AuthError::MalformedKey.kind(), ErrorKind::Invalid);
        assert_eq!(AuthError::Credentials.kind(), ErrorKind::Credential);
        assert_eq!(
            AuthError::Store(StoreError::Backend("down".to_string())).kind(),
            ErrorKind::Store
        );
        assert_eq!(AuthError::Store(StoreError::Cancelled).kind(), ErrorKind::Cancelled);
        assert_eq!(AuthError::Entropy("no /dev/urandom".to_string()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_store_errors_are_not_leaked() {
        let err = AuthError::Store(StoreError::Backend("pq: password=hunter2".to_string()));
        assert_eq!(err.sanitized_message(), "An internal server error occurred");
        assert_eq!(err.error_code(), "STORE_001");
    }

    #[test]
    fn test_store_cancellation_maps_to_cancelled() {
        let err: AuthError = StoreError::Cancelled.into();
        assert!(matches!(err, AuthError::Cancelled));
        let err: AuthError = StoreError::NotFound.into();
        assert_eq!(err.kind(), ErrorKind::Store);
    }

    #[test]
    fn test_from_lookup() {
        assert!(matches!(
            AuthError::from_lookup(StoreError::NotFound, AuthError::CodeNotFound),
            AuthError::CodeNotFound
        ));
        assert!(matches!(
            AuthError::from_lookup(StoreError::Cancelled, AuthError::CodeNotFound),
            AuthError::Cancelled
        ));
        assert!(matches!(
            AuthError::from_lookup(StoreError::Conflict, AuthError::CodeNotFound),
            AuthError::Store(StoreError::Conflict)
        ));
    }
}
