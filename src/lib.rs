//! qrlock - capability tokens for QR-code access to maintenance resources
//!
//! A token grants scoped, time-boxed, optionally scan-limited access to one
//! resource (an asset, work order, PM schedule, ...) of one tenant, without
//! a tenant session. Tokens are HMAC-SHA256 signed; the owning tenant id and
//! any metadata ride inside the payload AES-256-GCM encrypted. Stores and
//! audit rows only ever see the SHA-256 reference of a token, never the
//! token itself.
//!
//! [`TokenIssuer`] mints tokens and [`TokenValidator`] runs the scan
//! pipeline: rate limit, signature, expiry, tenant membership, revocation
//! and scan limit, permissions, then an atomically counted scan. Every
//! attempt lands in the audit trail, whatever its outcome.

pub mod audit;
pub mod config;
pub mod limiter;
pub mod policy;
pub mod service;
pub mod storage;
pub mod token;

pub use audit::{AuditRecord, GeoPoint, ScanContext, ScanOutcome};
pub use config::{ConfigError, EncryptionKey, ServiceConfig, SigningKey};
pub use limiter::{RateLimitConfig, RateLimiter};
pub use policy::{PermissionResolver, PermissionSet, Role};
pub use service::{
    DenialReason, Granted, IssueError, IssueOptions, IssuedToken, TokenIssuer, TokenValidator,
    Validation,
};
pub use storage::{
    AuditSink, MembershipDirectory, MemoryStore, MetadataStore, PostgresConfig, PostgresStore,
    ScanUpdate, StorageError, TokenMetadata,
};
pub use token::{
    token_ref, ClaimsError, ResourceType, TenantCipher, TokenClaims, TokenCodec, TokenError,
};
