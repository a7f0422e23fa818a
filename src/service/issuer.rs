//! Token issuance

use crate::audit::AuditRecord;
use crate::config::ServiceConfig;
use crate::storage::{AuditSink, MetadataStore, StorageError};
use crate::token::{
    self, screen_metadata, validate_permissions, validate_resource_id, validate_scan_limit,
    CipherError, ClaimsError, ResourceType, TenantCipher, TokenClaims, TokenCodec, TokenError,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Issuance errors
#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Claims(#[from] ClaimsError),

    #[error("encryption error: {0}")]
    Cipher(#[from] CipherError),

    #[error("signing error: {0}")]
    Token(#[from] TokenError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Optional knobs accompanying an issuance request
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    /// Expiry shorthand like "30m" or "7d"; the configured default applies
    /// when absent
    pub expires_in: Option<String>,

    /// Cap on successful scans (1-10000)
    pub scan_limit: Option<u32>,

    /// Metadata object to seal into the token
    pub metadata: Option<Map<String, Value>>,

    /// Principal recorded in the issuance audit record
    pub issued_by: Option<String>,
}

/// A freshly minted token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The presentable credential; shown once, never stored
    pub token: String,

    /// Storage reference derived from the token
    pub token_ref: String,

    pub expires_at: DateTime<Utc>,
}

/// Mints capability tokens and creates their metadata rows.
pub struct TokenIssuer {
    codec: TokenCodec,
    cipher: TenantCipher,
    default_ttl: chrono::Duration,
    metadata_store: Arc<dyn MetadataStore>,
    audit: Arc<dyn AuditSink>,
}

impl TokenIssuer {
    pub fn new(
        config: &ServiceConfig,
        metadata_store: Arc<dyn MetadataStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(
                config.signing_key.as_bytes(),
                &config.issuer,
                &config.audience,
            ),
            cipher: TenantCipher::new(config.encryption_key.as_bytes()),
            default_ttl: config.default_ttl,
            metadata_store,
            audit,
        }
    }

    /// Mint a token granting `permissions` on one resource of one tenant.
    ///
    /// Inputs are validated before any cryptography runs. The metadata row
    /// is created before the token is returned; a token this method hands
    /// out is always known to the validator.
    pub async fn issue(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        tenant_id: i64,
        permissions: Vec<String>,
        options: IssueOptions,
    ) -> Result<IssuedToken, IssueError> {
        validate_resource_id(resource_id)?;
        validate_permissions(&permissions)?;
        if let Some(limit) = options.scan_limit {
            validate_scan_limit(limit)?;
        }

        let ttl = match options.expires_in.as_deref() {
            Some(shorthand) => token::parse_expiry(shorthand)?,
            None => self.default_ttl,
        };
        let now = Utc::now();
        let expires_at = now + ttl;

        let metadata_ciphertext = match &options.metadata {
            Some(map) => {
                screen_metadata(map)?;
                Some(self.cipher.encrypt_metadata(map)?)
            }
            None => None,
        };

        let claims = TokenClaims {
            iss: self.codec.issuer().to_string(),
            aud: self.codec.audience().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            nonce: token::fresh_nonce(),
            resource_type,
            resource_id: resource_id.to_string(),
            tenant_ciphertext: self.cipher.encrypt_tenant(tenant_id)?,
            permissions,
            metadata_ciphertext,
            scan_limit: options.scan_limit,
        };

        let token = self.codec.sign(&claims)?;
        let token_ref = token::token_ref(&token);

        self.metadata_store.create(&token_ref).await?;

        let issued_by = options.issued_by.as_deref().unwrap_or("system");
        self.audit
            .append(&AuditRecord::issuance(&token_ref, issued_by, tenant_id))
            .await?;

        info!(
            token_ref = %token_ref,
            resource_type = %claims.resource_type,
            resource_id = %claims.resource_id,
            tenant_id,
            expires_at = %expires_at,
            scan_limit = ?claims.scan_limit,
            "Issued token"
        );

        Ok(IssuedToken {
            token,
            token_ref,
            expires_at,
        })
    }
}
