//! Token claims and input validation
//!
//! Everything that ends up inside the signed payload lives here, along with
//! the checks issuance runs before any cryptography happens: resource id and
//! permission grammar, scan-limit bounds, the expiry shorthand ("30m", "24h",
//! "7d"), and the metadata key screen that keeps secrets out of tokens.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Maximum length of a resource identifier
pub const MAX_RESOURCE_ID_LEN: usize = 100;

/// Upper bound on per-token scan limits
pub const MAX_SCAN_LIMIT: u32 = 10_000;

/// Metadata keys containing any of these fragments are refused at issuance.
/// Token payloads are bearer-readable once decoded, so secret-shaped values
/// must never ride along.
const RESTRICTED_KEY_FRAGMENTS: &[&str] = &["password", "secret", "key", "token", "ssn", "credit"];

/// Claims validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("resource id must be 1-{MAX_RESOURCE_ID_LEN} characters from [A-Za-z0-9_-]")]
    InvalidResourceId,
    #[error("permission '{0}' must be non-empty and drawn from [A-Za-z0-9:_-]")]
    InvalidPermission(String),
    #[error("at least one permission is required")]
    NoPermissions,
    #[error("scan limit must be between 1 and {MAX_SCAN_LIMIT}, got {0}")]
    ScanLimitOutOfRange(u32),
    #[error("invalid expiry '{0}': expected a positive integer followed by s, m, h, or d")]
    InvalidExpiry(String),
    #[error("metadata key '{0}' looks like a secret and cannot be embedded in a token")]
    RestrictedMetadataKey(String),
}

/// Resource kinds a token can grant access to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Asset,
    WorkOrder,
    PmSchedule,
    Location,
    User,
    Part,
    Portal,
}

impl ResourceType {
    pub const ALL: [ResourceType; 7] = [
        ResourceType::Asset,
        ResourceType::WorkOrder,
        ResourceType::PmSchedule,
        ResourceType::Location,
        ResourceType::User,
        ResourceType::Part,
        ResourceType::Portal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Asset => "asset",
            ResourceType::WorkOrder => "work-order",
            ResourceType::PmSchedule => "pm-schedule",
            ResourceType::Location => "location",
            ResourceType::User => "user",
            ResourceType::Part => "part",
            ResourceType::Portal => "portal",
        }
    }

    /// Parse a kebab-case resource type name
    pub fn parse(s: &str) -> Option<ResourceType> {
        match s.to_lowercase().as_str() {
            "asset" => Some(ResourceType::Asset),
            "work-order" => Some(ResourceType::WorkOrder),
            "pm-schedule" => Some(ResourceType::PmSchedule),
            "location" => Some(ResourceType::Location),
            "user" => Some(ResourceType::User),
            "part" => Some(ResourceType::Part),
            "portal" => Some(ResourceType::Portal),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The signed payload of a capability token.
///
/// `tenant_ciphertext` and `metadata_ciphertext` are AES-256-GCM sealed; the
/// raw tenant id never appears in the (bearer-readable) payload. Timestamps
/// are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// 128-bit random value; makes every issuance textually unique
    pub nonce: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
    /// Encrypted owning-tenant id
    pub tenant_ciphertext: String,
    /// Permissions the bearer must hold for the scan to succeed
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_ciphertext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_limit: Option<u32>,
}

impl TokenClaims {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

fn is_resource_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_permission_char(c: char) -> bool {
    is_resource_id_char(c) || c == ':'
}

/// Check a resource identifier against the allowed grammar
pub fn validate_resource_id(resource_id: &str) -> Result<(), ClaimsError> {
    if resource_id.is_empty()
        || resource_id.len() > MAX_RESOURCE_ID_LEN
        || !resource_id.chars().all(is_resource_id_char)
    {
        return Err(ClaimsError::InvalidResourceId);
    }
    Ok(())
}

/// Check a single permission string against the allowed grammar
pub fn validate_permission(permission: &str) -> Result<(), ClaimsError> {
    if permission.is_empty() || !permission.chars().all(is_permission_char) {
        return Err(ClaimsError::InvalidPermission(permission.to_string()));
    }
    Ok(())
}

/// Check a required-permission list: non-empty, each entry well-formed
pub fn validate_permissions(permissions: &[String]) -> Result<(), ClaimsError> {
    if permissions.is_empty() {
        return Err(ClaimsError::NoPermissions);
    }
    for permission in permissions {
        validate_permission(permission)?;
    }
    Ok(())
}

pub fn validate_scan_limit(limit: u32) -> Result<(), ClaimsError> {
    if limit == 0 || limit > MAX_SCAN_LIMIT {
        return Err(ClaimsError::ScanLimitOutOfRange(limit));
    }
    Ok(())
}

/// Parse an expiry shorthand like "45s", "30m", "24h", or "7d".
///
/// Zero durations are rejected; a token that can never be presented is an
/// issuance mistake, not a use case.
pub fn parse_expiry(raw: &str) -> Result<chrono::Duration, ClaimsError> {
    let err = || ClaimsError::InvalidExpiry(raw.to_string());
    if raw.len() < 2 || !raw.is_ascii() {
        return Err(err());
    }
    let (count, unit) = raw.split_at(raw.len() - 1);
    if !count.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }
    let count: i64 = count.parse().map_err(|_| err())?;
    if count == 0 {
        return Err(err());
    }
    let unit_seconds: i64 = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3_600,
        "d" => 86_400,
        _ => return Err(err()),
    };
    let seconds = count.checked_mul(unit_seconds).ok_or_else(err)?;
    chrono::Duration::try_seconds(seconds).ok_or_else(err)
}

/// Refuse metadata whose keys (at any nesting depth) look like secrets
pub fn screen_metadata(metadata: &Map<String, Value>) -> Result<(), ClaimsError> {
    for (key, value) in metadata {
        let lowered = key.to_lowercase();
        if RESTRICTED_KEY_FRAGMENTS.iter().any(|f| lowered.contains(f)) {
            return Err(ClaimsError::RestrictedMetadataKey(key.clone()));
        }
        if let Value::Object(nested) = value {
            screen_metadata(nested)?;
        }
    }
    Ok(())
}
