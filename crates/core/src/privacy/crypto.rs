use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::assessment::EncryptedBlob;
use crate::errors::ApplicationError;

const NONCE_LEN: usize = 12;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key material")]
    InvalidKey,
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed: {0}")]
    Decrypt(String),
    #[error("payload serialization failed: {0}")]
    Serialization(String),
}

impl From<CryptoError> for ApplicationError {
    fn from(value: CryptoError) -> Self {
        Self::Crypto(value.to_string())
    }
}

/// Field-level encryption for health data at rest.
pub trait DataCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<EncryptedBlob, CryptoError>;
    fn decrypt(&self, blob: &EncryptedBlob) -> Result<String, CryptoError>;
}

pub fn encrypt_json<T: Serialize>(
    cipher: &dyn DataCipher,
    value: &T,
) -> Result<EncryptedBlob, CryptoError> {
    let plaintext =
        serde_json::to_string(value).map_err(|error| CryptoError::Serialization(error.to_string()))?;
    cipher.encrypt(&plaintext)
}

pub fn decrypt_json<T: DeserializeOwned>(
    cipher: &dyn DataCipher,
    blob: &EncryptedBlob,
) -> Result<T, CryptoError> {
    let plaintext = cipher.decrypt(blob)?;
    serde_json::from_str(&plaintext).map_err(|error| CryptoError::Serialization(error.to_string()))
}

/// AES-256-GCM with a SHA-256 derived key. Output is base64(nonce || ciphertext).
#[derive(Clone)]
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub fn from_secret(secret: &SecretString) -> Result<Self, CryptoError> {
        let key = Sha256::digest(secret.expose_secret().as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { cipher })
    }
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesGcmCipher([REDACTED])")
    }
}

impl DataCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &str) -> Result<EncryptedBlob, CryptoError> {
        let mut nonce_bytes = [0_u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(EncryptedBlob(STANDARD.encode(envelope)))
    }

    fn decrypt(&self, blob: &EncryptedBlob) -> Result<String, CryptoError> {
        let envelope =
            STANDARD.decode(&blob.0).map_err(|error| CryptoError::Decrypt(error.to_string()))?;
        if envelope.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt("envelope too short".to_owned()));
        }
        let (nonce, ciphertext) = envelope.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt("authentication tag mismatch".to_owned()))?;
        String::from_utf8(plaintext).map_err(|error| CryptoError::Decrypt(error.to_string()))
    }
}
