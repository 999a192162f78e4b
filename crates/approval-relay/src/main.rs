use std::path::PathBuf;
use std::sync::Arc;

use conclave_review::{router, BearerToken, CertificateStore, PendingStore, ReviewState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let auth_token = std::env::var("CONCLAVE_REVIEW_AUTH_TOKEN")
        .map_err(|_| anyhow::anyhow!("CONCLAVE_REVIEW_AUTH_TOKEN must be set"))?;

    let pending_db =
        std::env::var("CONCLAVE_REVIEW_PENDING_DB").unwrap_or_else(|_| "./data/pending.sqlite3".into());
    let cert_db = std::env::var("CONCLAVE_REVIEW_CERT_DB")
        .unwrap_or_else(|_| "./data/finality_certificates.sqlite3".into());

    let pending_path = PathBuf::from(pending_db);
    if let Some(parent) = pending_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cert_path = PathBuf::from(cert_db);
    if let Some(parent) = cert_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let state = Arc::new(ReviewState {
        pending: PendingStore::open(&pending_path)?,
        certificates: CertificateStore::open(&cert_path)?,
    });

    let app = router(state, BearerToken(auth_token));

    let port: u16 = std::env::var("CONCLAVE_REVIEW_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8090);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "review relay listening");
    axum::serve(listener, app).await?;

    Ok(())
}
