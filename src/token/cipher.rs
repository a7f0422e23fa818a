//! Tenant and metadata encryption
//!
//! Token payloads are readable by anyone who base64-decodes them, so the
//! owning tenant id and any attached metadata are sealed with AES-256-GCM
//! before they go into the claims. Each seal uses a fresh random 96-bit
//! nonce, prepended to the ciphertext; the whole buffer is base64url.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde_json::{Map, Value};
use thiserror::Error;

/// Prefix marking a metadata value as encrypted. Values without it are
/// treated as legacy plaintext and passed through on read.
pub const ENCRYPTED_METADATA_MARKER: &str = "enc:";

const NONCE_LEN: usize = 12;

/// Encryption and decryption errors
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("ciphertext decode error: {0}")]
    Decode(String),
    #[error("ciphertext shorter than its nonce")]
    TooShort,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("metadata serialization error: {0}")]
    Serialization(String),
    #[error("decrypted tenant id is not an integer")]
    NotAnInteger,
}

/// Seals tenant ids and metadata blobs under a deployment-wide key.
pub struct TenantCipher {
    cipher: Aes256Gcm,
}

impl TenantCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from(*key);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Encrypt a tenant id into an opaque base64url string
    pub fn encrypt_tenant(&self, tenant_id: i64) -> Result<String, CipherError> {
        self.seal(tenant_id.to_string().as_bytes())
    }

    /// Recover a tenant id from an opaque ciphertext
    pub fn decrypt_tenant(&self, ciphertext: &str) -> Result<i64, CipherError> {
        let plain = self.open(ciphertext)?;
        let text = String::from_utf8(plain).map_err(|_| CipherError::NotAnInteger)?;
        text.parse().map_err(|_| CipherError::NotAnInteger)
    }

    /// Encrypt a metadata object; the result carries the `enc:` marker
    pub fn encrypt_metadata(&self, metadata: &Map<String, Value>) -> Result<String, CipherError> {
        let json =
            serde_json::to_vec(metadata).map_err(|e| CipherError::Serialization(e.to_string()))?;
        Ok(format!("{}{}", ENCRYPTED_METADATA_MARKER, self.seal(&json)?))
    }

    /// Decrypt a stored metadata value to its JSON text.
    ///
    /// Values without the `enc:` marker predate encryption and are returned
    /// unchanged.
    pub fn decrypt_metadata(&self, stored: &str) -> Result<String, CipherError> {
        match stored.strip_prefix(ENCRYPTED_METADATA_MARKER) {
            Some(sealed) => {
                let plain = self.open(sealed)?;
                String::from_utf8(plain).map_err(|_| CipherError::DecryptionFailed)
            }
            None => Ok(stored.to_string()),
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut buf = nonce_bytes.to_vec();
        buf.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(buf))
    }

    fn open(&self, ciphertext: &str) -> Result<Vec<u8>, CipherError> {
        let raw = URL_SAFE_NO_PAD
            .decode(ciphertext)
            .map_err(|e| CipherError::Decode(e.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::TooShort);
        }
        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, sealed)
            .map_err(|_| CipherError::DecryptionFailed)
    }
}
