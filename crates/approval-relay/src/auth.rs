//! Bearer-token authentication for the review HTTP surface.

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct BearerToken(pub String);

/// Rejects requests whose `Authorization: Bearer <token>` header does not
/// constant-time-match the configured token. `/health` is mounted outside
/// this middleware and is never gated.
pub async fn require_bearer(
    axum::extract::State(expected): axum::extract::State<BearerToken>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.0.as_bytes())) => {
            Ok(next.run(request).await)
        }
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tokens_match_in_constant_time() {
        let a = b"same-token";
        let b = b"same-token";
        assert!(bool::from(a.ct_eq(b)));
    }

    #[test]
    fn different_tokens_do_not_match() {
        let a = b"same-token";
        let b = b"other-token";
        assert!(!bool::from(a.ct_eq(b)));
    }
}
