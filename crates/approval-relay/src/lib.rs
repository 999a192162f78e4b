//! Human-Review Queue, Finality Certificate, and the bearer-authenticated
//! review HTTP surface that fronts them.

pub mod auth;
pub mod certificate;
pub mod error;
pub mod http;
pub mod pending;

pub use auth::BearerToken;
pub use certificate::{CertificateEnvelope, CertificatePayload, CertificateSigner, CertificateStore};
pub use error::ReviewError;
pub use http::{router, ReviewState};
pub use pending::{FinalityOption, PendingPayload, PendingRow, PendingStore};
