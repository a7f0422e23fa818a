//! Capability token building blocks
//!
//! Pieces of the token itself:
//! - `claims`: the signed payload and the input grammar it must satisfy
//! - `codec`: HMAC-SHA256 signing and verification of the three-segment form
//! - `cipher`: AES-256-GCM sealing of tenant ids and metadata
//!
//! Stores and audit rows never hold a presentable token; they hold its
//! [`token_ref`], the SHA-256 digest of the full string.

mod cipher;
mod claims;
mod codec;

pub use cipher::{CipherError, TenantCipher, ENCRYPTED_METADATA_MARKER};
pub use claims::{
    parse_expiry, screen_metadata, validate_permission, validate_permissions,
    validate_resource_id, validate_scan_limit, ClaimsError, ResourceType, TokenClaims,
    MAX_RESOURCE_ID_LEN, MAX_SCAN_LIMIT,
};
pub use codec::{TokenCodec, TokenError, MIN_SEGMENT_LEN, TOKEN_ALGORITHM};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Issuance nonce length in bytes (128-bit)
pub const NONCE_LEN: usize = 16;

/// Derive the storage reference for a token string.
///
/// References are safe to persist and log; the token itself is not.
pub fn token_ref(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a fresh random nonce for a new issuance
pub fn fresh_nonce() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; NONCE_LEN];
    rng.fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_ref_is_deterministic() {
        let a = token_ref("aaaa.bbbb.cccc");
        let b = token_ref("aaaa.bbbb.cccc");
        assert_eq!(a, b);
        assert_ne!(a, token_ref("aaaa.bbbb.cccd"));
    }

    #[test]
    fn test_token_ref_is_a_digest_not_the_token() {
        let token = "aaaa.bbbb.cccc";
        let reference = token_ref(token);
        assert!(!reference.contains(token));
        // 32 digest bytes, base64url without padding
        assert_eq!(reference.len(), 43);
    }

    #[test]
    fn test_fresh_nonce_is_unique_and_sized() {
        let a = fresh_nonce();
        let b = fresh_nonce();
        assert_ne!(a, b);
        assert_eq!(URL_SAFE_NO_PAD.decode(&a).unwrap().len(), NONCE_LEN);
    }
}
