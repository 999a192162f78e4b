use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("pending row not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("proposal {0} already has a pending finality review")]
    DuplicateFinalityReview(uuid::Uuid),

    #[error("approvePending cannot resolve a finality_review row; use resolveFinalityPending")]
    WrongResolutionPath,

    #[error("certificate signature verification failed")]
    InvalidSignature,

    #[error("malformed certificate envelope: {0}")]
    MalformedEnvelope(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}
