//! Symmetric cipher utility.
//!
//! AES-256-GCM encryption of opaque byte payloads, with Argon2 password-based
//! key derivation:
//!
//! - [`EncryptionService`]: encrypt/decrypt with a 32-byte key
//! - [`EncryptedData`]: serializable nonce + ciphertext container
//! - [`derive_export_key`]: deterministic key for export archives, salted by
//!   user identity
//!
//! Three payload encodings are supported: the structured [`EncryptedData`],
//! a base64 JSON envelope, and a compact hex string with the 12-byte nonce
//! prepended to the ciphertext.
//!
//! ## Usage
//!
//! ```rust
//! use cipherstore_common::crypto::encryption::EncryptionService;
//!
//! let key = EncryptionService::generate_key();
//! let service = EncryptionService::new(key)?;
//!
//! let plaintext = b"sensitive data";
//! let encrypted = service.encrypt(plaintext)?;
//! let decrypted = service.decrypt(&encrypted)?;
//! assert_eq!(decrypted, plaintext);
//! # Ok::<(), cipherstore_common::error::CommonError>(())
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::SaltString;
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CommonError, CommonResult};

const ALGORITHM: &str = "AES-256-GCM";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Encrypted data container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub salt: Option<String>,
    pub algorithm: String,
}

/// AES-GCM encryption service with optional password-based key derivation.
pub struct EncryptionService {
    key: Vec<u8>,
    cipher: Aes256Gcm,
    password_salt: Option<String>,
}

impl std::fmt::Debug for EncryptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionService")
            .field("key", &"[REDACTED]")
            .field("password_salt", &self.password_salt.is_some())
            .finish()
    }
}

impl EncryptionService {
    /// Create a new encryption service from a raw 32-byte key.
    pub fn new(key: Vec<u8>) -> CommonResult<Self> {
        if key.len() != KEY_LEN {
            return Err(CommonError::internal("Encryption key must be exactly 32 bytes"));
        }

        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| {
            CommonError::internal(format!("Failed to create encryption cipher: {e}"))
        })?;

        Ok(Self { key, cipher, password_salt: None })
    }

    /// Derive an encryption key from a password using Argon2 and a fresh
    /// random salt.
    pub fn from_password(password: &str) -> CommonResult<Self> {
        Self::from_password_with_salt(password, None)
    }

    /// Derive an encryption key from a password and optional salt using Argon2.
    pub fn from_password_with_salt(password: &str, salt: Option<&str>) -> CommonResult<Self> {
        let salt = match salt {
            Some(existing) => SaltString::from_b64(existing)
                .map_err(|e| CommonError::internal(format!("Invalid password salt: {e}")))?,
            None => SaltString::generate(OsRng),
        };

        let mut key = vec![0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(password.as_bytes(), salt.as_str().as_bytes(), &mut key)
            .map_err(|e| CommonError::internal(format!("Key derivation failed: {e}")))?;

        let mut service = Self::new(key)?;
        service.password_salt = Some(salt.to_string());
        Ok(service)
    }

    /// Generate a random 32-byte symmetric key.
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Salt used for password derivation, if this service was built from one.
    pub fn password_salt(&self) -> Option<&str> {
        self.password_salt.as_deref()
    }

    /// Encrypt bytes into an `EncryptedData` payload.
    pub fn encrypt(&self, data: &[u8]) -> CommonResult<EncryptedData> {
        let nonce_bytes = Self::generate_nonce();
        let ciphertext = self
            .cipher
            .encrypt(&Nonce::from(nonce_bytes), data)
            .map_err(|e| CommonError::internal(format!("Encryption failed: {e}")))?;

        Ok(EncryptedData {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
            salt: self.password_salt.clone(),
            algorithm: ALGORITHM.to_string(),
        })
    }

    /// Decrypt an [`EncryptedData`] payload back into raw bytes.
    pub fn decrypt(&self, encrypted: &EncryptedData) -> CommonResult<Vec<u8>> {
        if encrypted.algorithm != ALGORITHM {
            return Err(CommonError::internal(format!(
                "Unsupported algorithm: {}",
                encrypted.algorithm
            )));
        }

        self.open(&encrypted.nonce, &encrypted.ciphertext)
    }

    /// Encrypt bytes and encode the payload as a base64 string.
    pub fn encrypt_to_string(&self, data: &[u8]) -> CommonResult<String> {
        let encrypted = self.encrypt(data)?;
        let serialized = serde_json::to_vec(&encrypted)?;
        Ok(BASE64.encode(serialized))
    }

    /// Decode a base64 string and decrypt the contained payload.
    pub fn decrypt_from_string(&self, encrypted_str: &str) -> CommonResult<Vec<u8>> {
        let decoded = BASE64
            .decode(encrypted_str)
            .map_err(|e| CommonError::internal(format!("Base64 decode failed: {e}")))?;
        let encrypted: EncryptedData = serde_json::from_slice(&decoded)?;
        self.decrypt(&encrypted)
    }

    /// Encrypt bytes into a hex string of `nonce || ciphertext`.
    pub fn encrypt_to_hex(&self, data: &[u8]) -> CommonResult<String> {
        let encrypted = self.encrypt(data)?;
        let mut combined = encrypted.nonce;
        combined.extend_from_slice(&encrypted.ciphertext);
        Ok(hex::encode(combined))
    }

    /// Decrypt a hex string produced by [`encrypt_to_hex`](Self::encrypt_to_hex).
    pub fn decrypt_from_hex(&self, encoded: &str) -> CommonResult<Vec<u8>> {
        let combined = hex::decode(encoded)
            .map_err(|e| CommonError::internal(format!("Hex decode failed: {e}")))?;
        if combined.len() <= NONCE_LEN {
            return Err(CommonError::internal("Encrypted payload is too short"));
        }
        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        self.open(nonce, ciphertext)
    }

    /// Generate a short fingerprint for the current key.
    pub fn key_fingerprint(&self) -> String {
        let digest = Sha256::digest(&self.key);
        BASE64.encode(&digest[..8])
    }

    fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> CommonResult<Vec<u8>> {
        let nonce_array: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
            CommonError::internal("Nonce must be exactly 12 bytes for AES-256-GCM")
        })?;

        self.cipher
            .decrypt(&Nonce::from(nonce_array), ciphertext)
            .map_err(|e| CommonError::internal(format!("Decryption failed: {e}")))
    }

    fn generate_nonce() -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}

/// Derive a 32-byte export key from a shared secret and the user's identity.
///
/// The salt is the first 16 bytes of `SHA-256(username || token)`, so the
/// same user and token always produce the same key.
pub fn derive_export_key(secret: &str, username: &str, token: &str) -> CommonResult<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update(token.as_bytes());
    let digest = hasher.finalize();

    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(secret.as_bytes(), &digest[..16], &mut key)
        .map_err(|e| CommonError::internal(format!("Key derivation failed: {e}")))?;
    Ok(key)
}
