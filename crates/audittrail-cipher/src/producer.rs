//! An event producer that seals payloads before they reach the chain.

use std::sync::Arc;

use audittrail_contracts::{AuditResult, EntryFields, StoredEntry};
use audittrail_core::ChainEngine;

use crate::payload::{PayloadCipher, BODY_FIELD, RESPONSE_FIELD};

/// Wraps a `ChainEngine` so every body and response is sealed before it is
/// hashed and stored. The chain sees only ciphertext.
#[derive(Clone)]
pub struct SealingProducer {
    engine: Arc<ChainEngine>,
    cipher: PayloadCipher,
}

impl SealingProducer {
    pub fn new(engine: Arc<ChainEngine>, cipher: PayloadCipher) -> Self {
        Self { engine, cipher }
    }

    pub fn engine(&self) -> &Arc<ChainEngine> {
        &self.engine
    }

    /// Seal the payloads of `fields` and append the entry.
    ///
    /// Absent payloads stay absent. A sealing failure aborts before anything
    /// is written.
    pub fn record(&self, mut fields: EntryFields) -> AuditResult<StoredEntry> {
        if let Some(body) = fields.body.take() {
            fields.body = Some(self.cipher.seal(BODY_FIELD, body.as_bytes())?);
        }
        if let Some(response) = fields.response.take() {
            fields.response = Some(self.cipher.seal(RESPONSE_FIELD, response.as_bytes())?);
        }
        self.engine.append_entry(fields)
    }
}
