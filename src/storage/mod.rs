//! Storage backends for token metadata, audit records, and membership
//!
//! - Postgres: Durable storage behind the three service-facing traits
//! - Memory: Process-local storage for tests and single-node development
//!
//! The service only ever talks to trait objects; both backends implement all
//! three traits.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PostgresConfig, PostgresStore};

use crate::audit::AuditRecord;
use crate::policy::Role;
pub use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Mutable per-token bookkeeping, keyed by token reference
#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub token_ref: String,
    pub scan_count: i64,
    pub is_revoked: bool,
    pub revoked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

/// Result of the conditional scan-count increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanUpdate {
    /// Counted; carries the new total
    Counted(i64),
    /// The scan limit was already reached, nothing was counted
    LimitReached,
    /// The token is revoked, nothing was counted
    Revoked,
    /// No metadata row exists for this reference
    NotFound,
}

/// Per-token scan counting and revocation flags
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create the initial row for a newly issued token
    async fn create(&self, token_ref: &str) -> Result<(), StorageError>;

    /// Fetch current metadata, if the token is known
    async fn fetch(&self, token_ref: &str) -> Result<Option<TokenMetadata>, StorageError>;

    /// Count one scan unless the token is revoked or, given a limit, already
    /// at it. The check and the increment are one atomic step; when scans
    /// race, exactly limit increments win.
    async fn increment_scan(
        &self,
        token_ref: &str,
        scan_limit: Option<u32>,
    ) -> Result<ScanUpdate, StorageError>;

    /// Revoke permanently, recording who did it. Revoking twice is a no-op;
    /// revoking an unknown reference is NotFound.
    async fn revoke(&self, token_ref: &str, revoked_by: &str) -> Result<(), StorageError>;
}

/// Append-only audit sink
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Durably append one record
    async fn append(&self, record: &AuditRecord) -> Result<(), StorageError>;
}

/// Bearer-to-tenant membership, maintained by the identity layer
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    /// The bearer's role within the tenant, or None when not a member
    async fn member_role(
        &self,
        tenant_id: i64,
        bearer_id: &str,
    ) -> Result<Option<Role>, StorageError>;
}
