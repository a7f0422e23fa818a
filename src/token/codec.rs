//! Token signing and verification
//!
//! Tokens are three dot-separated base64url segments: a header naming the
//! algorithm, the claims payload, and an HMAC-SHA256 over the first two.
//! Verification checks the algorithm allow-list and the signature before
//! touching the payload, and never consults the clock; expiry is the
//! validator's concern so that a stale token and a forged one stay
//! distinguishable.

use crate::token::claims::TokenClaims;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The only algorithm this service signs or accepts
pub const TOKEN_ALGORITHM: &str = "HS256";

/// Segments shorter than this are rejected before any decoding
pub const MIN_SEGMENT_LEN: usize = 8;

/// Token encoding and verification errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("wrong issuer: expected '{expected}', got '{got}'")]
    WrongIssuer { expected: String, got: String },
    #[error("wrong audience: expected '{expected}', got '{got}'")]
    WrongAudience { expected: String, got: String },
    #[error("token decode error: {0}")]
    DecodeError(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Signs claims into bearer tokens and verifies presented tokens back into
/// claims. One codec instance is bound to one key/issuer/audience triple.
pub struct TokenCodec {
    key: Vec<u8>,
    issuer: String,
    audience: String,
}

impl TokenCodec {
    pub fn new(key: &[u8], issuer: &str, audience: &str) -> Self {
        Self {
            key: key.to_vec(),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Serialize and sign claims into a presentable token string
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        let header = Header {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let header_json =
            serde_json::to_vec(&header).map_err(|e| TokenError::DecodeError(e.to_string()))?;
        let payload_json =
            serde_json::to_vec(claims).map_err(|e| TokenError::DecodeError(e.to_string()))?;

        let header_b64 = URL_SAFE_NO_PAD.encode(header_json);
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);
        let signature_b64 = URL_SAFE_NO_PAD.encode(self.mac_over(&header_b64, &payload_b64));

        Ok(format!("{}.{}.{}", header_b64, payload_b64, signature_b64))
    }

    /// Verify a presented token and decode its claims.
    ///
    /// Checks run in order: structure, algorithm, signature, then issuer and
    /// audience from the now-trusted payload. Expiry is not checked here.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.len() < MIN_SEGMENT_LEN) {
            return Err(TokenError::Malformed);
        }
        let (header_b64, payload_b64, signature_b64) = (segments[0], segments[1], segments[2]);

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::Malformed)?;
        let header: Header =
            serde_json::from_slice(&header_json).map_err(|_| TokenError::Malformed)?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        // verify_slice is constant-time
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;
        let claims: TokenClaims = serde_json::from_slice(&payload_json)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;

        if claims.iss != self.issuer {
            return Err(TokenError::WrongIssuer {
                expected: self.issuer.clone(),
                got: claims.iss,
            });
        }
        if claims.aud != self.audience {
            return Err(TokenError::WrongAudience {
                expected: self.audience.clone(),
                got: claims.aud,
            });
        }
        Ok(claims)
    }

    fn mac_over(&self, header_b64: &str, payload_b64: &str) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}
