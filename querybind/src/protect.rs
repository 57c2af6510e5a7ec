//! Sensitive-field protection
//!
//! Fields an entity marks as protected are stored transformed. The compiler
//! pushes comparison values through the same transform so an equality
//! predicate still matches the stored form.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ProtectError {
    #[error("Invalid protection key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed for {entity}.{field}")]
    Encrypt { entity: String, field: String },

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}

/// Transforms protected field values. Must be side-effect free.
pub trait ProtectFieldHandler: Send + Sync {
    fn encrypt(&self, entity: &str, field: &str, plain: &str) -> Result<String, ProtectError>;

    fn decrypt(&self, entity: &str, field: &str, cipher: &str) -> Result<String, ProtectError>;
}

/// Deterministic AES-256-GCM.
///
/// The nonce is derived from the key, the entity, the field and the plaintext,
/// so equal inputs produce equal ciphertexts. Output is
/// `base64(nonce || ciphertext)`.
pub struct AesProtectHandler {
    key: [u8; KEY_LEN],
    cipher: Aes256Gcm,
}

impl AesProtectHandler {
    pub fn new(key: &[u8]) -> Result<Self, ProtectError> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| {
            ProtectError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, key.len()))
        })?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ProtectError::InvalidKey(e.to_string()))?;
        Ok(Self { key, cipher })
    }

    /// Build from a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, ProtectError> {
        let key = BASE64
            .decode(encoded.trim())
            .map_err(|e| ProtectError::InvalidKey(e.to_string()))?;
        Self::new(&key)
    }

    /// A fresh random key, base64-encoded.
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        BASE64.encode(key)
    }

    fn nonce(&self, entity: &str, field: &str, plain: &str) -> [u8; NONCE_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(self.key);
        hasher.update(entity.as_bytes());
        hasher.update([0]);
        hasher.update(field.as_bytes());
        hasher.update([0]);
        hasher.update(plain.as_bytes());
        let digest = hasher.finalize();

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&digest[..NONCE_LEN]);
        nonce
    }
}

impl std::fmt::Debug for AesProtectHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesProtectHandler").finish_non_exhaustive()
    }
}

impl ProtectFieldHandler for AesProtectHandler {
    fn encrypt(&self, entity: &str, field: &str, plain: &str) -> Result<String, ProtectError> {
        let nonce = self.nonce(entity, field, plain);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plain.as_bytes())
            .map_err(|_| ProtectError::Encrypt {
                entity: entity.to_string(),
                field: field.to_string(),
            })?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    fn decrypt(&self, _entity: &str, _field: &str, cipher: &str) -> Result<String, ProtectError> {
        let bytes = BASE64
            .decode(cipher)
            .map_err(|e| ProtectError::Decrypt(e.to_string()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(ProtectError::Decrypt("ciphertext too short".into()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ProtectError::Decrypt("authentication failed".into()))?;
        String::from_utf8(plain).map_err(|e| ProtectError::Decrypt(e.to_string()))
    }
}
