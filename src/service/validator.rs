//! Token validation
//!
//! The scan pipeline, in a fixed order so the cheapest checks run first and
//! every attempt is auditable: rate limit, signature, expiry, tenant
//! membership, revocation and scan limit, permissions, then the counted
//! increment. Exactly one audit record is appended per attempt, before the
//! caller sees the result.

use crate::audit::{AuditRecord, ScanContext, ScanOutcome};
use crate::config::ServiceConfig;
use crate::limiter::RateLimiter;
use crate::policy::{PermissionResolver, PermissionSet, Role};
use crate::storage::{AuditSink, MembershipDirectory, MetadataStore, ScanUpdate, StorageError};
use crate::token::{self, TenantCipher, TokenClaims, TokenCodec};
use chrono::Utc;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a policy check refused an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    RateLimited,
    OrganizationMismatch,
    Revoked,
    ScanLimitExceeded,
    InsufficientPermissions,
    UnknownToken,
}

impl DenialReason {
    /// Operator-facing description
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::RateLimited => "rate limit exceeded",
            DenialReason::OrganizationMismatch => "organization mismatch",
            DenialReason::Revoked => "token revoked",
            DenialReason::ScanLimitExceeded => "scan limit exceeded",
            DenialReason::InsufficientPermissions => "insufficient permissions",
            DenialReason::UnknownToken => "unknown token",
        }
    }

    /// Label safe to show an untrusted caller.
    ///
    /// Policy denials collapse into one message so responses do not reveal
    /// whether a token was revoked, exhausted, or presented by the wrong
    /// person. Rate limiting keeps its own label: the right reaction to it
    /// is to wait, not to retry harder.
    pub fn public_label(&self) -> &'static str {
        match self {
            DenialReason::RateLimited => "rate limit exceeded",
            _ => "access denied",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A successful validation: every check passed and the scan was counted
#[derive(Debug)]
pub struct Granted {
    pub claims: TokenClaims,
    pub tenant_id: i64,
    pub role: Role,
    /// The bearer's full resolved permission set
    pub permissions: PermissionSet,
    /// This scan's position in the token's count
    pub scan_count: i64,
    /// Decrypted metadata, when the token carries any
    pub metadata: Option<Value>,
}

/// Discriminated outcome of one validation attempt.
///
/// Rejections are values, not errors; only storage failures escape as `Err`.
#[derive(Debug)]
pub enum Validation {
    Granted(Granted),
    /// The token failed structural or cryptographic checks
    Invalid(String),
    /// The token is past its expiry
    Expired,
    /// A policy check refused the attempt
    Denied(DenialReason),
}

impl Validation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Validation::Granted(_))
    }

    /// Outcome class recorded in the audit trail
    pub fn outcome(&self) -> ScanOutcome {
        match self {
            Validation::Granted(_) => ScanOutcome::Success,
            Validation::Invalid(_) => ScanOutcome::Invalid,
            Validation::Expired => ScanOutcome::Expired,
            Validation::Denied(_) => ScanOutcome::Denied,
        }
    }

    /// Operator-facing description of the result
    pub fn describe(&self) -> String {
        match self {
            Validation::Granted(_) => "ok".to_string(),
            Validation::Invalid(detail) => detail.clone(),
            Validation::Expired => "token expired".to_string(),
            Validation::Denied(reason) => reason.as_str().to_string(),
        }
    }

    /// Label safe to show an untrusted caller
    pub fn public_label(&self) -> &'static str {
        match self {
            Validation::Granted(_) => "ok",
            Validation::Invalid(_) => "invalid token",
            Validation::Expired => "token expired",
            Validation::Denied(reason) => reason.public_label(),
        }
    }
}

/// Runs the scan pipeline against presented tokens.
pub struct TokenValidator {
    codec: TokenCodec,
    cipher: TenantCipher,
    resolver: PermissionResolver,
    limiter: Arc<RateLimiter>,
    metadata_store: Arc<dyn MetadataStore>,
    directory: Arc<dyn MembershipDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl TokenValidator {
    pub fn new(
        config: &ServiceConfig,
        limiter: Arc<RateLimiter>,
        metadata_store: Arc<dyn MetadataStore>,
        directory: Arc<dyn MembershipDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            codec: TokenCodec::new(
                config.signing_key.as_bytes(),
                &config.issuer,
                &config.audience,
            ),
            cipher: TenantCipher::new(config.encryption_key.as_bytes()),
            resolver: PermissionResolver::new(),
            limiter,
            metadata_store,
            directory,
            audit,
        }
    }

    /// Validate a presented token for a bearer, counting the scan when every
    /// check passes.
    pub async fn validate(
        &self,
        token: &str,
        bearer_id: &str,
        ctx: &ScanContext,
    ) -> Result<Validation, StorageError> {
        let token_ref = token::token_ref(token);
        debug!(
            token_ref = %token_ref,
            bearer_id = %bearer_id,
            source = %ctx.source_address,
            risk_score = ctx.risk_score(),
            "Validating token"
        );

        // 1. Rate limit, before any cryptography
        if !self.limiter.check_and_record(&token_ref, &ctx.source_address) {
            warn!(token_ref = %token_ref, source = %ctx.source_address, "Scan rate limit exceeded");
            let denied = Validation::Denied(DenialReason::RateLimited);
            return self.reject(&token_ref, bearer_id, 0, ctx, denied).await;
        }

        // 2. Structure, algorithm, signature, issuer, audience
        let claims = match self.codec.verify(token) {
            Ok(claims) => claims,
            Err(err) => {
                warn!(token_ref = %token_ref, error = %err, "Token failed verification");
                let invalid = Validation::Invalid(err.to_string());
                return self.reject(&token_ref, bearer_id, 0, ctx, invalid).await;
            }
        };

        // 3. Expiry; a stale token is not a forged one
        if claims.is_expired(Utc::now()) {
            return self
                .reject(&token_ref, bearer_id, 0, ctx, Validation::Expired)
                .await;
        }

        // 4. Tenant resolution and membership
        let tenant_id = match self.cipher.decrypt_tenant(&claims.tenant_ciphertext) {
            Ok(tenant_id) => tenant_id,
            Err(err) => {
                warn!(token_ref = %token_ref, error = %err, "Tenant ciphertext failed to decrypt");
                let invalid = Validation::Invalid(err.to_string());
                return self.reject(&token_ref, bearer_id, 0, ctx, invalid).await;
            }
        };
        let role = match self.directory.member_role(tenant_id, bearer_id).await? {
            Some(role) => role,
            None => {
                let denied = Validation::Denied(DenialReason::OrganizationMismatch);
                return self.reject(&token_ref, bearer_id, tenant_id, ctx, denied).await;
            }
        };

        // 5. Metadata row: revocation flag and scan limit
        let metadata = match self.metadata_store.fetch(&token_ref).await? {
            Some(metadata) => metadata,
            None => {
                // Signed by us but never persisted; treat as hostile
                warn!(token_ref = %token_ref, "Validly signed token with no metadata row");
                let denied = Validation::Denied(DenialReason::UnknownToken);
                return self.reject(&token_ref, bearer_id, tenant_id, ctx, denied).await;
            }
        };
        if metadata.is_revoked {
            let denied = Validation::Denied(DenialReason::Revoked);
            return self.reject(&token_ref, bearer_id, tenant_id, ctx, denied).await;
        }
        if let Some(limit) = claims.scan_limit {
            if metadata.scan_count >= i64::from(limit) {
                let denied = Validation::Denied(DenialReason::ScanLimitExceeded);
                return self.reject(&token_ref, bearer_id, tenant_id, ctx, denied).await;
            }
        }

        // 6. Permissions
        let held = self.resolver.resolve(role).clone();
        if !self.resolver.satisfies(&held, &claims.permissions) {
            let denied = Validation::Denied(DenialReason::InsufficientPermissions);
            return self.reject(&token_ref, bearer_id, tenant_id, ctx, denied).await;
        }

        // 7. Success path: decrypt metadata, then the counted increment. The
        // store re-checks revocation and the limit; races lose here.
        let token_metadata = match claims.metadata_ciphertext.as_deref() {
            Some(stored) => match self.cipher.decrypt_metadata(stored) {
                Ok(text) => Some(serde_json::from_str(&text).unwrap_or(Value::String(text))),
                Err(err) => {
                    warn!(token_ref = %token_ref, error = %err, "Token metadata failed to decrypt");
                    let invalid = Validation::Invalid(err.to_string());
                    return self.reject(&token_ref, bearer_id, tenant_id, ctx, invalid).await;
                }
            },
            None => None,
        };

        let update = self
            .metadata_store
            .increment_scan(&token_ref, claims.scan_limit)
            .await?;
        let scan_count = match update {
            ScanUpdate::Counted(count) => count,
            ScanUpdate::LimitReached => {
                let denied = Validation::Denied(DenialReason::ScanLimitExceeded);
                return self.reject(&token_ref, bearer_id, tenant_id, ctx, denied).await;
            }
            ScanUpdate::Revoked => {
                let denied = Validation::Denied(DenialReason::Revoked);
                return self.reject(&token_ref, bearer_id, tenant_id, ctx, denied).await;
            }
            ScanUpdate::NotFound => {
                let denied = Validation::Denied(DenialReason::UnknownToken);
                return self.reject(&token_ref, bearer_id, tenant_id, ctx, denied).await;
            }
        };

        let record = AuditRecord::new(&token_ref, bearer_id, tenant_id, ctx, ScanOutcome::Success);
        self.audit.append(&record).await?;

        debug!(token_ref = %token_ref, tenant_id, scan_count, "Token validated");

        Ok(Validation::Granted(Granted {
            claims,
            tenant_id,
            role,
            permissions: held,
            scan_count,
            metadata: token_metadata,
        }))
    }

    /// Append the audit record for a rejection, then hand it back
    async fn reject(
        &self,
        token_ref: &str,
        bearer_id: &str,
        tenant_id: i64,
        ctx: &ScanContext,
        validation: Validation,
    ) -> Result<Validation, StorageError> {
        let record = AuditRecord::new(token_ref, bearer_id, tenant_id, ctx, validation.outcome());
        self.audit.append(&record).await?;
        Ok(validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classes() {
        assert_eq!(
            Validation::Invalid("x".to_string()).outcome(),
            ScanOutcome::Invalid
        );
        assert_eq!(Validation::Expired.outcome(), ScanOutcome::Expired);
        assert_eq!(
            Validation::Denied(DenialReason::Revoked).outcome(),
            ScanOutcome::Denied
        );
    }

    #[test]
    fn test_public_labels_collapse_policy_denials() {
        for reason in [
            DenialReason::OrganizationMismatch,
            DenialReason::Revoked,
            DenialReason::ScanLimitExceeded,
            DenialReason::InsufficientPermissions,
            DenialReason::UnknownToken,
        ] {
            assert_eq!(reason.public_label(), "access denied");
        }
        assert_eq!(DenialReason::RateLimited.public_label(), "rate limit exceeded");
    }

    #[test]
    fn test_describe_keeps_detail_for_operators() {
        let v = Validation::Invalid("invalid token signature".to_string());
        assert_eq!(v.describe(), "invalid token signature");
        assert_eq!(v.public_label(), "invalid token");

        let v = Validation::Denied(DenialReason::OrganizationMismatch);
        assert_eq!(v.describe(), "organization mismatch");
        assert_eq!(v.public_label(), "access denied");
    }
}
