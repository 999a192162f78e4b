//! Finality Certificate: a compact, Ed25519-signed JWS-shaped envelope over
//! a scope's terminal decision record.

use std::sync::Mutex;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine};
use conclave_runtime::types::{DecisionRecord, ScopeId};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::ReviewError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CertificateHeader {
    alg: &'static str,
    typ: &'static str,
}

impl Default for CertificateHeader {
    fn default() -> Self {
        Self {
            alg: "EdDSA",
            typ: "JWS",
        }
    }
}

/// The signed content of a certificate: a scope's terminal decision plus
/// whatever supporting snapshot the finality evaluator captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificatePayload {
    pub scope_id: ScopeId,
    pub decision: DecisionRecord,
    pub dimensions_snapshot: Option<serde_json::Value>,
    pub policy_version_hashes: Vec<String>,
    pub issued_at: chrono::DateTime<chrono::Utc>,
}

/// A three-part compact signed envelope:
/// `base64url(header).base64url(payload).base64url(signature)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEnvelope(pub String);

impl std::fmt::Display for CertificateEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signs and verifies finality certificates. Loads an Ed25519 key from
/// configuration; if absent, generates an ephemeral key at process start
/// (only in-process verification works against that key afterward).
pub struct CertificateSigner {
    signing_key: SigningKey,
}

impl CertificateSigner {
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Generates an ephemeral key. Certificates signed with it only verify
    /// within this process's lifetime.
    pub fn ephemeral() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn build_payload(
        scope_id: ScopeId,
        decision: DecisionRecord,
        dimensions_snapshot: Option<serde_json::Value>,
        policy_version_hashes: Vec<String>,
    ) -> CertificatePayload {
        CertificatePayload {
            scope_id,
            decision,
            dimensions_snapshot,
            policy_version_hashes,
            issued_at: chrono::Utc::now(),
        }
    }

    pub fn sign(&self, payload: &CertificatePayload) -> Result<CertificateEnvelope, ReviewError> {
        let header = CertificateHeader::default();
        let header_b64 = B64.encode(serde_json::to_vec(&header)?);
        let payload_b64 = B64.encode(serde_json::to_vec(payload)?);
        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        let signature_b64 = B64.encode(signature.to_bytes());
        Ok(CertificateEnvelope(format!(
            "{signing_input}.{signature_b64}"
        )))
    }

    pub fn verify(
        &self,
        envelope: &CertificateEnvelope,
    ) -> Result<CertificatePayload, ReviewError> {
        verify_with_key(envelope, &self.verifying_key())
    }
}

/// Validates the three-part structure and signature against a given key,
/// without requiring a `CertificateSigner` (e.g. a third party checking a
/// certificate against a published public key).
pub fn verify_with_key(
    envelope: &CertificateEnvelope,
    verifying_key: &VerifyingKey,
) -> Result<CertificatePayload, ReviewError> {
    let parts: Vec<&str> = envelope.0.split('.').collect();
    let [header_b64, payload_b64, signature_b64] = parts[..] else {
        return Err(ReviewError::MalformedEnvelope(
            "expected exactly three dot-separated parts".into(),
        ));
    };

    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature_bytes = B64.decode(signature_b64)?;
    let signature_bytes: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| ReviewError::MalformedEnvelope("signature is not 64 bytes".into()))?;
    let signature = Signature::from_bytes(&signature_bytes);

    verifying_key
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| ReviewError::InvalidSignature)?;

    let payload_json = B64.decode(payload_b64)?;
    let payload: CertificatePayload = serde_json::from_slice(&payload_json)?;
    Ok(payload)
}

/// Persists signed envelopes and decoded payloads, one row per
/// certificate, keyed by scope.
pub struct CertificateStore {
    conn: Mutex<Connection>,
}

impl CertificateStore {
    pub fn open_in_memory() -> Result<Self, ReviewError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: &std::path::Path) -> Result<Self, ReviewError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<(), ReviewError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS finality_certificates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scope_id TEXT NOT NULL,
                envelope TEXT NOT NULL,
                payload TEXT NOT NULL,
                issued_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn persist(
        &self,
        envelope: &CertificateEnvelope,
        payload: &CertificatePayload,
    ) -> Result<(), ReviewError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO finality_certificates (scope_id, envelope, payload, issued_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                payload.scope_id.to_string(),
                envelope.0,
                serde_json::to_string(payload)?,
                payload.issued_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_latest(
        &self,
        scope_id: ScopeId,
    ) -> Result<Option<CertificateEnvelope>, ReviewError> {
        let conn = self.conn.lock().unwrap();
        let envelope: Option<String> = conn
            .query_row(
                "SELECT envelope FROM finality_certificates
                 WHERE scope_id = ?1 ORDER BY id DESC LIMIT 1",
                params![scope_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(envelope.map(CertificateEnvelope))
    }
}
