//! Content encryption at rest.
//!
//! Every resource body is sealed with AES-256-GCM under the process-wide
//! content key and a fresh random 96-bit nonce. The tag is stored apart from
//! the ciphertext so each column has a fixed meaning.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    /// Wrong key, tampered ciphertext or a malformed nonce/tag.
    #[error("Decryption failed")]
    DecryptionFailed,
}

/// Output of [`ContentCipher::seal`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedContent {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; NONCE_LEN],
    pub auth_tag: [u8; TAG_LEN],
}

#[derive(Clone)]
pub struct ContentCipher {
    cipher: Aes256Gcm,
}

impl ContentCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Build from a 64-character hex key.
    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid hex: {e}")))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected {KEY_LEN} bytes, got {}", b.len()))
        })?;
        Ok(Self::new(key))
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedContent, CryptoError> {
        let iv: [u8; NONCE_LEN] = rand::random();

        let mut ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let tag_start = ciphertext
            .len()
            .checked_sub(TAG_LEN)
            .ok_or(CryptoError::EncryptionFailed)?;
        let tag = ciphertext.split_off(tag_start);
        let auth_tag: [u8; TAG_LEN] = tag
            .try_into()
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(SealedContent {
            ciphertext,
            iv,
            auth_tag,
        })
    }

    pub fn open(&self, ciphertext: &[u8], iv: &[u8], auth_tag: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if iv.len() != NONCE_LEN || auth_tag.len() != TAG_LEN {
            return Err(CryptoError::DecryptionFailed);
        }

        let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        combined.extend_from_slice(ciphertext);
        combined.extend_from_slice(auth_tag);

        self.cipher
            .decrypt(Nonce::from_slice(iv), combined.as_slice())
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

impl fmt::Debug for ContentCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContentCipher(..)")
    }
}

/// SHA-256 digest of a plaintext body.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// 64-character lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Compare against a stored hex digest. Case-insensitive.
    pub fn matches_hex(&self, stored: &str) -> bool {
        self.to_hex().eq_ignore_ascii_case(stored)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
