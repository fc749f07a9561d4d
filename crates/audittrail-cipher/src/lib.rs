//! # audittrail-cipher
//!
//! Field-level confidentiality for ledger payloads.
//!
//! Bodies and responses are sealed with AES-256-GCM before they are handed
//! to the chain engine, so the ledger hashes and stores ciphertext as opaque
//! text. Verification never needs the key.
//!
//! ```rust,ignore
//! use audittrail_cipher::{KeyMaterial, PayloadCipher, SealingProducer};
//!
//! let key = KeyMaterial::from_file(Path::new("/etc/audittrail.key"))?;
//! let producer = SealingProducer::new(engine, PayloadCipher::new(&key));
//! producer.record(EntryFields::new("POST", "/login", 200).body("{\"pw\":\"...\"}"))?;
//! ```
//!
//! Key handling fails closed: `PayloadCipher::from_settings` refuses an
//! enabled configuration without a usable key instead of writing plaintext.

pub mod key;
pub mod payload;
pub mod producer;

pub use key::{KeyMaterial, KEY_LEN};
pub use payload::{is_sealed, PayloadCipher, BODY_FIELD, RESPONSE_FIELD, SEALED_PREFIX};
pub use producer::SealingProducer;

// ── Tests ─────────────────────────────────────────────────────────────────────
