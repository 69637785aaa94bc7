// ============================
// crates/backend-lib/src/auth/password.rs
// ============================
//! Password hashing and verification.
use scrypt::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Params, Scrypt,
};
use zeroize::Zeroize;

use crate::config::{PasswordRequirements, PasswordSettings};
use crate::error::AuthError;

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 10;

/// Derived key length stored in the PHC string
const HASH_LEN: usize = 32;

/// Hashes and verifies passwords with scrypt at a fixed work factor.
///
/// Hashes are PHC strings that embed their own parameters, so raising the
/// work factor later keeps older hashes verifiable.
#[derive(Clone)]
pub struct CredentialVerifier {
    params: Params,
    /// Burned on logins for unknown usernames
    dummy_hash: String,
}

impl std::fmt::Debug for CredentialVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVerifier")
            .field("log_n", &self.params.log_n())
            .field("r", &self.params.r())
            .field("p", &self.params.p())
            .finish()
    }
}

impl CredentialVerifier {
    /// Create a verifier using the configured work factor
    pub fn new(settings: &PasswordSettings) -> Result<Self, AuthError> {
        let params = Params::new(settings.log_n, settings.r, settings.p, HASH_LEN)
            .map_err(|e| AuthError::InvalidInput(format!("scrypt parameters: {e}")))?;
        let dummy_hash = hash_with(&params, "feedgate-dummy-password")?;
        Ok(Self { params, dummy_hash })
    }

    /// Hash a password
    pub fn hash(&self, plain: &str) -> Result<String, AuthError> {
        hash_with(&self.params, plain)
    }

    /// Verify a password against a hash. Never errors: mismatches and
    /// unparseable hashes are both `false`.
    pub fn verify(&self, hash: &str, plain: &str) -> bool {
        verify_password(hash, plain)
    }

    /// Spend the same effort as a real verification without a stored hash
    pub fn verify_dummy(&self, plain: &str) {
        let _ = verify_password(&self.dummy_hash, plain);
    }

    /// Securely hash a password and zeroize the original
    pub fn hash_secure(&self, plain: &mut String) -> Result<String, AuthError> {
        let hash = self.hash(plain);
        plain.zeroize();
        hash
    }
}

fn hash_with(params: &Params, plain: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Scrypt
        .hash_password_customized(plain.as_bytes(), None, None, params.clone(), &salt)
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            AuthError::Hash(e.to_string())
        })?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(hash: &str, plain: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Scrypt.verify_password(plain.as_bytes(), &parsed_hash).is_ok()
}

/// Check if a password meets the complexity requirements
pub fn validate_password_strength(password: &str, requirements: &PasswordRequirements) -> bool {
    if password.chars().count() < requirements.min_length {
        return false;
    }

    if requirements.require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
        return false;
    }

    if requirements.require_lowercase && !password.chars().any(|c| c.is_lowercase()) {
        return false;
    }

    if requirements.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }

    if requirements.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
        return false;
    }

    true
}
