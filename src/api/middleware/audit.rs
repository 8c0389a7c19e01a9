//! Audit logging middleware.
//!
//! Logs every API request with the caller (when authenticated), method,
//! path and response status. Runs innermost (after auth has injected
//! `AuthUser`).

use axum::extract::OriginalUri;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::{ApiContext, AuthUser};

/// Record API access for the audit trail.
/// Accesses `ApiContext` from request extensions.
pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    // Nested routers see the path without the `/api` prefix
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let ctx = req.extensions().get::<ApiContext>().cloned();
    let caller = req
        .extensions()
        .get::<AuthUser>()
        .map(|user| (user.id(), user.role()));

    let response = next.run(req).await;

    if let Some(ctx) = ctx {
        let status = response.status().as_u16();
        tracing::debug!(%method, %path, status, "API request");
        ctx.core.log_access(
            caller.as_ref().map(|(id, _)| id),
            caller.map(|(_, role)| role),
            &format!("{method} {path}"),
            status,
        );
    }

    response
}
