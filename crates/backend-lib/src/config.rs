// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::auth::password::MIN_PASSWORD_LENGTH;
use crate::auth::token_generator::{SESSION_KEY_BYTES, TOKEN_KEY_BYTES};

/// Environment variable prefix, nested keys use `__` (e.g. `FEEDGATE_SESSION__SHORT_TTL_SECS`)
pub const ENV_PREFIX: &str = "FEEDGATE_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Upper bound for every configured lifetime (100 years)
pub const MAX_TTL_SECS: u64 = 60 * 60 * 24 * 365 * 100;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    pub session: SessionSettings,
    pub oauth: OAuthSettings,
    pub password: PasswordSettings,
    pub rate_limit: RateLimitSettings,
}

/// Session lifetimes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Lifetime of a regular session
    pub short_ttl_secs: u64,
    /// Lifetime of a "stay logged in" session
    pub long_ttl_secs: u64,
    /// Random bytes per session key
    pub key_bytes: usize,
}

/// Authorization-code grant settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    pub code_ttl_secs: u64,
    pub code_bytes: usize,
    pub token_bytes: usize,
    pub access_token_ttl_secs: i64,
    /// The only scope ever granted
    pub default_scope: String,
    /// Delete the superseded token pair whenever a refresh token is used
    pub rotate_refresh_tokens: bool,
}

/// scrypt work factor and password complexity rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordSettings {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
    pub requirements: PasswordRequirements,
}

/// Password complexity requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordRequirements {
    /// Minimum password length
    pub min_length: usize,
    /// Require uppercase letters
    pub require_uppercase: bool,
    /// Require lowercase letters
    pub require_lowercase: bool,
    /// Require digits
    pub require_digit: bool,
    /// Require special characters
    pub require_special: bool,
}

/// Failed-login throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub max_attempts: u32,
    pub lockout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            session: SessionSettings::default(),
            oauth: OAuthSettings::default(),
            password: PasswordSettings::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            short_ttl_secs: 60 * 60,               // 1 hour
            long_ttl_secs: 60 * 60 * 24 * 365 * 5, // 5 years
            key_bytes: SESSION_KEY_BYTES,
        }
    }
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            code_ttl_secs: 10 * 60,
            code_bytes: TOKEN_KEY_BYTES,
            token_bytes: TOKEN_KEY_BYTES,
            access_token_ttl_secs: 3600,
            default_scope: "all".to_string(),
            rotate_refresh_tokens: true,
        }
    }
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
            requirements: PasswordRequirements::default(),
        }
    }
}

impl PasswordSettings {
    /// A cheap work factor for tests and local tooling
    pub fn low_cost() -> Self {
        Self {
            log_n: 4,
            ..Self::default()
        }
    }
}

impl Default for PasswordRequirements {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_secs: 5 * 60,
        }
    }
}

impl SessionSettings {
    pub fn ttl(&self, stay_logged_in: bool) -> Duration {
        if stay_logged_in {
            Duration::from_secs(self.long_ttl_secs)
        } else {
            Duration::from_secs(self.short_ttl_secs)
        }
    }
}

impl Settings {
    /// Load from `config.toml` in the working directory (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load from the given TOML file (if present), then environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        extract(Self::figment(path).merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load from the given TOML file only, ignoring the environment
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        extract(Self::figment(path))
    }

    fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file(path.as_ref()))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            bail!("invalid log level: {}", self.log_level);
        }
        if self.session.short_ttl_secs == 0 || self.session.long_ttl_secs == 0 {
            bail!("session ttl must be positive");
        }
        if self.session.short_ttl_secs > MAX_TTL_SECS || self.session.long_ttl_secs > MAX_TTL_SECS {
            bail!("session ttl must not exceed {MAX_TTL_SECS} seconds");
        }
        if self.session.key_bytes < 16 || self.oauth.code_bytes < 16 || self.oauth.token_bytes < 16 {
            bail!("keys must carry at least 16 random bytes");
        }
        if self.oauth.code_ttl_secs == 0 || self.oauth.access_token_ttl_secs <= 0 {
            bail!("oauth ttl must be positive");
        }
        if self.oauth.code_ttl_secs > MAX_TTL_SECS
            || self.oauth.access_token_ttl_secs > MAX_TTL_SECS as i64
        {
            bail!("oauth ttl must not exceed {MAX_TTL_SECS} seconds");
        }
        if self.oauth.default_scope.trim().is_empty() {
            bail!("default scope must not be empty");
        }
        if scrypt::Params::new(self.password.log_n, self.password.r, self.password.p, 32).is_err() {
            bail!("invalid scrypt parameters");
        }
        if self.password.requirements.min_length < 8 {
            bail!("minimum password length must be at least 8");
        }
        if self.rate_limit.max_attempts == 0 {
            bail!("rate limit max_attempts must be positive");
        }
        Ok(())
    }
}

fn extract(figment: Figment) -> Result<Settings> {
    let settings: Settings = figment.extract()?;
    settings.validate()?;
    Ok(settings)
}
