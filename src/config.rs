//! Service configuration
//!
//! Both keys are explicit and required; there is no development fallback. A
//! process with a missing or malformed key refuses to start rather than
//! minting tokens nobody intended to honor.

use crate::limiter::RateLimitConfig;
use crate::token::parse_expiry;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default issuer claim
pub const DEFAULT_ISSUER: &str = "qrlock";

/// Default audience claim
pub const DEFAULT_AUDIENCE: &str = "qrlock-scan";

const KEY_LEN: usize = 32;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{0} must be a {1}-byte hex string")]
    BadKey(&'static str, usize),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

fn decode_key(hex_str: &str) -> Option<[u8; KEY_LEN]> {
    let bytes = hex::decode(hex_str.trim()).ok()?;
    bytes.try_into().ok()
}

/// HMAC signing key for tokens
#[derive(Clone)]
pub struct SigningKey([u8; KEY_LEN]);

impl SigningKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, ConfigError> {
        decode_key(hex_str)
            .map(Self)
            .ok_or(ConfigError::BadKey("signing key", KEY_LEN))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningKey([REDACTED])")
    }
}

/// AES-256-GCM key for tenant and metadata encryption
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, ConfigError> {
        decode_key(hex_str)
            .map(Self)
            .ok_or(ConfigError::BadKey("encryption key", KEY_LEN))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

/// Configuration for the issuer and validator
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub signing_key: SigningKey,
    pub encryption_key: EncryptionKey,

    /// `iss` claim stamped into and required of every token
    pub issuer: String,

    /// `aud` claim stamped into and required of every token
    pub audience: String,

    /// Token lifetime when issuance does not say otherwise
    pub default_ttl: chrono::Duration,

    /// Per-(token, source) scan attempt bounds
    pub rate_limit: RateLimitConfig,
}

impl ServiceConfig {
    /// Create a configuration with the given keys and default everything else
    pub fn new(signing_key: SigningKey, encryption_key: EncryptionKey) -> Self {
        Self {
            signing_key,
            encryption_key,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            default_ttl: chrono::Duration::hours(24),
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Set the issuer claim
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Set the audience claim
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Set the default token lifetime
    pub fn default_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the rate limit bounds
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Read configuration from the environment.
    ///
    /// QRLOCK_SIGNING_KEY and QRLOCK_ENCRYPTION_KEY are required (64 hex
    /// characters each). QRLOCK_TOKEN_TTL, QRLOCK_SCAN_WINDOW_MS,
    /// QRLOCK_SCAN_MAX_ATTEMPTS, QRLOCK_ISSUER, and QRLOCK_AUDIENCE are
    /// optional overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let signing = std::env::var("QRLOCK_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("QRLOCK_SIGNING_KEY"))?;
        let encryption = std::env::var("QRLOCK_ENCRYPTION_KEY")
            .map_err(|_| ConfigError::Missing("QRLOCK_ENCRYPTION_KEY"))?;

        let mut config = Self::new(
            SigningKey::from_hex(&signing)?,
            EncryptionKey::from_hex(&encryption)?,
        );

        if let Ok(ttl) = std::env::var("QRLOCK_TOKEN_TTL") {
            config.default_ttl = parse_expiry(&ttl).map_err(|e| ConfigError::Invalid {
                name: "QRLOCK_TOKEN_TTL",
                reason: e.to_string(),
            })?;
        }
        if let Ok(window) = std::env::var("QRLOCK_SCAN_WINDOW_MS") {
            let ms: u64 = window.parse().map_err(|_| ConfigError::Invalid {
                name: "QRLOCK_SCAN_WINDOW_MS",
                reason: "expected milliseconds as an integer".to_string(),
            })?;
            config.rate_limit.window = Duration::from_millis(ms);
        }
        if let Ok(max) = std::env::var("QRLOCK_SCAN_MAX_ATTEMPTS") {
            config.rate_limit.max_attempts = max.parse().map_err(|_| ConfigError::Invalid {
                name: "QRLOCK_SCAN_MAX_ATTEMPTS",
                reason: "expected a positive integer".to_string(),
            })?;
        }
        if let Ok(issuer) = std::env::var("QRLOCK_ISSUER") {
            config.issuer = issuer;
        }
        if let Ok(audience) = std::env::var("QRLOCK_AUDIENCE") {
            config.audience = audience;
        }

        Ok(config)
    }
}
