//! In-memory storage backend

use crate::audit::AuditRecord;
use crate::policy::Role;
use crate::storage::{
    AuditSink, MembershipDirectory, MetadataStore, ScanUpdate, StorageError, TokenMetadata,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;

/// Process-local implementation of all three storage traits.
///
/// Membership rows are seeded through [`add_member`](Self::add_member); in a
/// deployment the identity layer owns that data.
#[derive(Default)]
pub struct MemoryStore {
    metadata: DashMap<String, TokenMetadata>,
    audit: RwLock<Vec<AuditRecord>>,
    members: DashMap<(i64, String), Role>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bearer as a member of a tenant
    pub fn add_member(&self, tenant_id: i64, bearer_id: impl Into<String>, role: Role) {
        self.members.insert((tenant_id, bearer_id.into()), role);
    }

    /// Snapshot of every audit record appended so far
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.read().clone()
    }

    /// Audit records for one token reference, oldest first
    pub fn audit_records_for(&self, token_ref: &str) -> Vec<AuditRecord> {
        self.audit
            .read()
            .iter()
            .filter(|r| r.token_ref == token_ref)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn create(&self, token_ref: &str) -> Result<(), StorageError> {
        self.metadata.insert(
            token_ref.to_string(),
            TokenMetadata {
                token_ref: token_ref.to_string(),
                scan_count: 0,
                is_revoked: false,
                revoked_by: None,
                created_at: Utc::now(),
                last_scanned_at: None,
            },
        );
        Ok(())
    }

    async fn fetch(&self, token_ref: &str) -> Result<Option<TokenMetadata>, StorageError> {
        Ok(self.metadata.get(token_ref).map(|m| m.value().clone()))
    }

    async fn increment_scan(
        &self,
        token_ref: &str,
        scan_limit: Option<u32>,
    ) -> Result<ScanUpdate, StorageError> {
        // The exclusive entry guard serializes racing increments on one token
        let mut entry = match self.metadata.get_mut(token_ref) {
            Some(entry) => entry,
            None => return Ok(ScanUpdate::NotFound),
        };
        if entry.is_revoked {
            return Ok(ScanUpdate::Revoked);
        }
        if let Some(limit) = scan_limit {
            if entry.scan_count >= i64::from(limit) {
                return Ok(ScanUpdate::LimitReached);
            }
        }
        entry.scan_count += 1;
        entry.last_scanned_at = Some(Utc::now());
        Ok(ScanUpdate::Counted(entry.scan_count))
    }

    async fn revoke(&self, token_ref: &str, revoked_by: &str) -> Result<(), StorageError> {
        let mut entry = match self.metadata.get_mut(token_ref) {
            Some(entry) => entry,
            None => {
                return Err(StorageError::NotFound(format!(
                    "token metadata not found: {}",
                    token_ref
                )))
            }
        };
        if !entry.is_revoked {
            entry.is_revoked = true;
            entry.revoked_by = Some(revoked_by.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, record: &AuditRecord) -> Result<(), StorageError> {
        self.audit.write().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl MembershipDirectory for MemoryStore {
    async fn member_role(
        &self,
        tenant_id: i64,
        bearer_id: &str,
    ) -> Result<Option<Role>, StorageError> {
        Ok(self
            .members
            .get(&(tenant_id, bearer_id.to_string()))
            .map(|r| *r.value()))
    }
}
