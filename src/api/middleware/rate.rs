//! Per-client rate limiting middleware.
//!
//! Applies sliding-window rate limits per client:
//! - 100 requests per minute
//! - 1000 requests per hour
//!
//! Public routes are keyed by client address only. Protected routes are
//! keyed by the verified account, falling back to the address for tokens
//! that do not verify.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

/// Client address. `X-Forwarded-For` is honoured only when the peer is a
/// loopback proxy, or when no peer address is known (in-process tests).
fn address_key(req: &Request<axum::body::Body>) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let forwarded = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match (peer, forwarded) {
        (Some(ip), Some(fwd)) if ip.is_loopback() => format!("ip:{fwd}"),
        (Some(ip), _) => format!("ip:{ip}"),
        (None, Some(fwd)) => format!("ip:{fwd}"),
        (None, None) => "anonymous".to_string(),
    }
}

/// Verified account when the bearer token checks out, else the address.
fn account_key(ctx: &ApiContext, req: &Request<axum::body::Body>) -> String {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| ctx.core.verify_session(token).ok())
        .map(|claims| format!("user:{}", claims.sub))
        .unwrap_or_else(|| address_key(req))
}

/// Rate limiting for authenticated routes. Returns 429 if exceeded.
/// Accesses `ApiContext` from request extensions.
pub async fn limit(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(req, next, account_key).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// Rate limiting for public routes: the `Authorization` header is ignored.
pub async fn limit_by_address(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(req, next, |_, req| address_key(req)).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(
    req: Request<axum::body::Body>,
    next: Next,
    key_of: impl Fn(&ApiContext, &Request<axum::body::Body>) -> String,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = key_of(&ctx, &req);

    // MutexGuard is !Send: must drop before .await via block scope
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        limiter
            .check(&key)
            .map_err(|retry_after| ApiError::RateLimited { retry_after })?;
    }

    Ok(next.run(req).await)
}
