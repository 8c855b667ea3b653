//! Credential decryption and the authenticated session handed to connectors
//!
//! Credentials arrive on events either in plain text or encrypted with
//! AES-256-GCM as `base64(nonce || ciphertext)`. Without a configured key
//! values pass through unchanged.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;

use crate::error::{Error, Result};

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (256 bits)
const KEY_SIZE: usize = 32;

/// Access key pair for the provider
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Region plus decrypted credentials for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub region: String,
    pub credentials: Credentials,
}

/// Decrypts credential material with an optional key
#[derive(Clone, Default)]
pub struct CredentialDecryptor {
    key: Option<[u8; KEY_SIZE]>,
}

impl std::fmt::Debug for CredentialDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialDecryptor")
            .field("key", &self.key.map(|_| "[REDACTED]"))
            .finish()
    }
}

impl CredentialDecryptor {
    /// An empty key behaves like no key at all
    pub fn new(key: Option<&str>) -> Result<Self> {
        match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(k) => Ok(Self {
                key: Some(parse_key(k)?),
            }),
            None => Ok(Self::default()),
        }
    }

    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn is_passthrough(&self) -> bool {
        self.key.is_none()
    }

    pub fn decrypt(&self, value: &str) -> Result<String> {
        let Some(key) = self.key else {
            return Ok(value.to_string());
        };

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::credentials(format!("Failed to create cipher: {e}")))?;

        let bytes = BASE64
            .decode(value.trim())
            .map_err(|e| Error::credentials(format!("Invalid ciphertext base64: {e}")))?;

        if bytes.len() <= NONCE_SIZE {
            return Err(Error::credentials("Ciphertext too short"));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_SIZE);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| Error::credentials(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::credentials(format!("Invalid UTF-8 in decrypted value: {e}")))
    }

    /// Inverse of [`decrypt`](Self::decrypt); values pass through without a key
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let Some(key) = self.key else {
            return Ok(plaintext.to_string());
        };

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::credentials(format!("Failed to create cipher: {e}")))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| Error::credentials(format!("Encryption failed: {e}")))?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    pub fn session(&self, region: &str, access_key_id: &str, secret_access_key: &str) -> Result<Session> {
        Ok(Session {
            region: region.to_string(),
            credentials: Credentials {
                access_key_id: self.decrypt(access_key_id)?,
                secret_access_key: self.decrypt(secret_access_key)?,
            },
        })
    }
}

/// Accepts 32 raw characters, 64 hex digits or base64 of 32 bytes
fn parse_key(key_str: &str) -> Result<[u8; KEY_SIZE]> {
    let mut key = [0u8; KEY_SIZE];

    if key_str.len() == KEY_SIZE {
        key.copy_from_slice(key_str.as_bytes());
        return Ok(key);
    }

    if key_str.len() == KEY_SIZE * 2
        && let Ok(bytes) = hex::decode(key_str)
    {
        key.copy_from_slice(&bytes);
        return Ok(key);
    }

    let bytes = BASE64
        .decode(key_str)
        .map_err(|e| Error::credentials(format!("Invalid crypto key: {e}")))?;

    if bytes.len() != KEY_SIZE {
        return Err(Error::credentials(format!(
            "Crypto key must be {} bytes, got {}",
            KEY_SIZE,
            bytes.len()
        )));
    }

    key.copy_from_slice(&bytes);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW_KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn passthrough_without_key() {
        let decryptor = CredentialDecryptor::new(None).unwrap();
        assert!(decryptor.is_passthrough());
        assert_eq!(decryptor.decrypt("AKIAEXAMPLE").unwrap(), "AKIAEXAMPLE");

        let empty = CredentialDecryptor::new(Some("  ")).unwrap();
        assert!(empty.is_passthrough());
    }

    #[test]
    fn encrypted_value_decrypts() {
        let decryptor = CredentialDecryptor::new(Some(RAW_KEY)).unwrap();
        let sealed = decryptor.encrypt("wJalrXUtnFEMI").unwrap();
        assert_ne!(sealed, "wJalrXUtnFEMI");
        assert_eq!(decryptor.decrypt(&sealed).unwrap(), "wJalrXUtnFEMI");
    }

    #[test]
    fn hex_and_base64_keys_are_equivalent() {
        let hex_key = hex::encode(RAW_KEY.as_bytes());
        let b64_key = BASE64.encode(RAW_KEY.as_bytes());
        let sealed = CredentialDecryptor::new(Some(RAW_KEY))
            .unwrap()
            .encrypt("secret")
            .unwrap();

        for key in [hex_key, b64_key] {
            let decryptor = CredentialDecryptor::new(Some(&key)).unwrap();
            assert_eq!(decryptor.decrypt(&sealed).unwrap(), "secret");
        }
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = CredentialDecryptor::new(Some(RAW_KEY))
            .unwrap()
            .encrypt("secret")
            .unwrap();
        let other = CredentialDecryptor::new(Some("fedcba9876543210fedcba9876543210")).unwrap();
        let err = other.decrypt(&sealed).unwrap_err();
        assert_eq!(err.kind_name(), "credentials");
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(CredentialDecryptor::new(Some("short")).is_err());
    }

    #[test]
    fn debug_never_prints_secrets() {
        let session = CredentialDecryptor::passthrough()
            .session("eu-west-1", "AKIA", "topsecret")
            .unwrap();
        let printed = format!("{:?}", session);
        assert!(printed.contains("AKIA"));
        assert!(!printed.contains("topsecret"));
    }
}
