//! The bearer-authenticated review HTTP surface: `/pending`, `/approve/:id`,
//! `/reject/:id`, `/finality-response/:id`, `/health`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use conclave_runtime::types::ScopeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_bearer, BearerToken};
use crate::certificate::CertificateStore;
use crate::pending::{FinalityOption, PendingPayload, PendingStore};

pub struct ReviewState {
    pub pending: PendingStore,
    pub certificates: CertificateStore,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct RejectBody {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct FinalityResponseBody {
    pub option: FinalityOption,
    pub days: Option<u32>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn err_response(status: StatusCode, message: impl ToString) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

async fn get_pending(State(state): State<Arc<ReviewState>>) -> impl IntoResponse {
    match state.pending.get_pending() {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => err_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn approve(
    State(state): State<Arc<ReviewState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.pending.approve_pending(id) {
        Ok(proposal) => Json(proposal).into_response(),
        Err(crate::error::ReviewError::NotFound(_)) => {
            err_response(StatusCode::NOT_FOUND, "no such pending row")
        }
        Err(crate::error::ReviewError::WrongResolutionPath) => err_response(
            StatusCode::CONFLICT,
            "row is a finality_review; use /finality-response/:id",
        ),
        Err(e) => err_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn reject(
    State(state): State<Arc<ReviewState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectBody>,
) -> impl IntoResponse {
    match state.pending.reject_pending(id, &body.reason) {
        Ok((scope_id, reason)) => Json(serde_json::json!({
            "scope_id": scope_id,
            "reason": reason,
        }))
        .into_response(),
        Err(crate::error::ReviewError::NotFound(_)) => {
            err_response(StatusCode::NOT_FOUND, "no such pending row")
        }
        Err(e) => err_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn finality_response(
    State(state): State<Arc<ReviewState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<FinalityResponseBody>,
) -> impl IntoResponse {
    match state
        .pending
        .resolve_finality_pending(id, body.option, body.days)
    {
        Ok((scope_id, option, days)) => Json(serde_json::json!({
            "scope_id": scope_id,
            "option": option,
            "days": days,
        }))
        .into_response(),
        Err(crate::error::ReviewError::NotFound(_)) => {
            err_response(StatusCode::NOT_FOUND, "no such pending row")
        }
        Err(crate::error::ReviewError::WrongResolutionPath) => err_response(
            StatusCode::CONFLICT,
            "row is not a finality_review; use /approve/:id or /reject/:id",
        ),
        Err(e) => err_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

async fn latest_certificate(
    State(state): State<Arc<ReviewState>>,
    Path(scope_id): Path<Uuid>,
) -> impl IntoResponse {
    let scope_id = ScopeId(scope_id);
    match state.certificates.get_latest(scope_id) {
        Ok(Some(envelope)) => Json(serde_json::json!({ "certificate": envelope.0 })).into_response(),
        Ok(None) => err_response(StatusCode::NOT_FOUND, "no certificate for scope"),
        Err(e) => err_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub fn router(state: Arc<ReviewState>, auth_token: BearerToken) -> Router {
    let gated = Router::new()
        .route("/pending", get(get_pending))
        .route("/approve/:id", post(approve))
        .route("/reject/:id", post(reject))
        .route("/finality-response/:id", post(finality_response))
        .route("/certificates/:scope_id", get(latest_certificate))
        .route_layer(middleware::from_fn_with_state(auth_token, require_bearer))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .merge(gated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::{CertificateSigner, CertificateStore};
    use axum::body::Body;
    use axum::http::Request;
    use conclave_runtime::types::{Action, AgentId, Proposal, ProposalId, ScopeStatus};
    use tower::ServiceExt;

    fn state() -> Arc<ReviewState> {
        Arc::new(ReviewState {
            pending: PendingStore::open_in_memory().unwrap(),
            certificates: CertificateStore::open_in_memory().unwrap(),
        })
    }

    #[tokio::test]
    async fn health_requires_no_auth() {
        let app = router(state(), BearerToken("secret-token".into()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn pending_without_token_is_unauthorized() {
        let app = router(state(), BearerToken("secret-token".into()));
        let response = app
            .oneshot(Request::builder().uri("/pending").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn pending_with_token_lists_rows() {
        let s = state();
        let scope_id = ScopeId::new();
        let proposal = Proposal {
            id: ProposalId::new(),
            scope_id,
            role: "planner".into(),
            agent_id: AgentId::new(),
            actions: vec![Action::AdvanceState {
                to: ScopeStatus::Resolved,
            }],
            created_at: chrono::Utc::now(),
        };
        s.pending
            .add_pending(
                proposal.id.0,
                scope_id,
                PendingPayload::AdvanceState { proposal },
            )
            .unwrap();

        let app = router(s, BearerToken("secret-token".into()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/pending")
                    .header("Authorization", "Bearer secret-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn certificate_lookup_returns_latest() {
        let s = state();
        let signer = CertificateSigner::ephemeral();
        let scope_id = ScopeId::new();
        let decision = conclave_runtime::types::DecisionRecord {
            id: conclave_runtime::types::DecisionId::new(),
            scope_id,
            proposal_id: ProposalId::new(),
            policy_version: "v1".into(),
            decision: conclave_runtime::types::Decision::Allow,
            obligations: vec![],
            suggested_actions: vec![],
            binding: true,
            decided_at: chrono::Utc::now(),
        };
        let payload = CertificateSigner::build_payload(scope_id, decision, None, vec![]);
        let envelope = signer.sign(&payload).unwrap();
        s.certificates.persist(&envelope, &payload).unwrap();

        let app = router(s, BearerToken("secret-token".into()));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/certificates/{scope_id}"))
                    .header("Authorization", "Bearer secret-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
