//! Sealing and opening of body/response payloads.
//!
//! Sealed text format:
//!
//!   "v1:" + base64( nonce[12] || ciphertext || tag[16] )
//!
//! The field name (`body` or `response`) is the AEAD associated data, so a
//! sealed body copied into the response column fails to open.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use tracing::debug;

use audittrail_config::{expand_home, EncryptionSettings};
use audittrail_contracts::{AuditResult, AuditTrailError};

use crate::key::KeyMaterial;

/// Prefix of every sealed payload.
pub const SEALED_PREFIX: &str = "v1:";

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Associated data for the `body` column.
pub const BODY_FIELD: &str = "body";

/// Associated data for the `response` column.
pub const RESPONSE_FIELD: &str = "response";

/// AES-256-GCM over ledger payload fields.
#[derive(Clone)]
pub struct PayloadCipher {
    cipher: Aes256Gcm,
}

impl PayloadCipher {
    pub fn new(key: &KeyMaterial) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }

    /// Build the cipher the settings call for.
    ///
    /// Returns `Ok(None)` when encryption is disabled. When it is enabled the
    /// key file must be named, readable and valid; anything else is an
    /// `AuditTrailError::Configuration`.
    pub fn from_settings(settings: &EncryptionSettings) -> AuditResult<Option<Self>> {
        if !settings.enabled {
            return Ok(None);
        }
        let key_file = settings.key_file.as_deref().ok_or_else(|| {
            AuditTrailError::configuration(
                "encryption is enabled but no key_file is configured; run `audittrail keygen`",
            )
        })?;
        let key = KeyMaterial::from_file(&expand_home(key_file))?;
        debug!(key_file = %key_file.display(), "payload encryption enabled");
        Ok(Some(Self::new(&key)))
    }

    /// Encrypt `plaintext` bound to `field`.
    pub fn seal(&self, field: &str, plaintext: &[u8]) -> AuditResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: field.as_bytes(),
                },
            )
            .map_err(|_| AuditTrailError::cipher(format!("failed to seal {}", field)))?;

        let mut framed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend_from_slice(&ciphertext);
        Ok(format!("{}{}", SEALED_PREFIX, STANDARD.encode(framed)))
    }

    /// Decrypt text produced by `seal` for the same `field`.
    ///
    /// Fails with `AuditTrailError::Cipher` on a missing prefix, bad base64,
    /// a truncated frame, the wrong key or the wrong field.
    pub fn open(&self, field: &str, sealed: &str) -> AuditResult<Vec<u8>> {
        let encoded = sealed.strip_prefix(SEALED_PREFIX).ok_or_else(|| {
            AuditTrailError::cipher(format!("{} is not a sealed payload", field))
        })?;
        let framed = STANDARD.decode(encoded).map_err(|e| {
            AuditTrailError::cipher(format!("sealed {} is not valid base64: {}", field, e))
        })?;
        if framed.len() <= NONCE_LEN {
            return Err(AuditTrailError::cipher(format!("sealed {} is truncated", field)));
        }
        let (nonce, ciphertext) = framed.split_at(NONCE_LEN);

        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: field.as_bytes(),
                },
            )
            .map_err(|_| {
                AuditTrailError::cipher(format!(
                    "failed to open {}: wrong key or altered ciphertext",
                    field
                ))
            })
    }

    /// Display form of a stored column: sealed text is opened, anything else
    /// (plaintext rows, empty payloads) is returned as stored.
    pub fn reveal(&self, field: &str, stored: &str) -> AuditResult<String> {
        if !is_sealed(stored) {
            return Ok(stored.to_string());
        }
        let plaintext = self.open(field, stored)?;
        Ok(String::from_utf8_lossy(&plaintext).into_owned())
    }
}

impl fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PayloadCipher(Aes256Gcm)")
    }
}

/// Whether a stored column holds sealed text.
pub fn is_sealed(stored: &str) -> bool {
    stored.starts_with(SEALED_PREFIX)
}
