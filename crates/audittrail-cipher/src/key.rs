//! Key material for payload sealing.
//!
//! A key file holds one line: the standard base64 encoding of 32 random
//! bytes. Keys are created only by an explicit `write_new`, never as a side
//! effect of loading.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use tracing::info;

use audittrail_contracts::{AuditResult, AuditTrailError};

/// Length of an AES-256 key in bytes.
pub const KEY_LEN: usize = 32;

/// A 256-bit symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    bytes: [u8; KEY_LEN],
}

impl KeyMaterial {
    /// Draw a fresh key from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Decode a base64 key. Surrounding whitespace is ignored.
    ///
    /// Returns `AuditTrailError::Configuration` unless the text decodes to
    /// exactly 32 bytes.
    pub fn from_base64(text: &str) -> AuditResult<Self> {
        let decoded = STANDARD.decode(text.trim()).map_err(|e| {
            AuditTrailError::configuration(format!("key material is not valid base64: {}", e))
        })?;
        let bytes: [u8; KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
            AuditTrailError::configuration(format!(
                "key material must be {} bytes, got {}",
                KEY_LEN,
                decoded.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Load a key file written by `write_new`.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AuditTrailError::configuration(format!(
                "failed to read key file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_base64(&text)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Write this key to a new file at `path`.
    ///
    /// Refuses to replace an existing file. On Unix the file is created with
    /// mode 0600.
    pub fn write_new(&self, path: &Path) -> AuditResult<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                AuditTrailError::configuration(format!(
                    "key file '{}' already exists; refusing to overwrite",
                    path.display()
                ))
            } else {
                AuditTrailError::configuration(format!(
                    "failed to create key file '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;
        writeln!(file, "{}", self.to_base64()).map_err(|e| {
            AuditTrailError::configuration(format!(
                "failed to write key file '{}': {}",
                path.display(),
                e
            ))
        })?;

        info!(path = %path.display(), "key material written");
        Ok(())
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}
