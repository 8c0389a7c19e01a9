//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, verifies the signed session
//! token, and injects `AuthUser` into request extensions for downstream
//! handlers. The account is re-read on every request: suspensions and role
//! changes apply to tokens already issued.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::accounts::AccountError;
use crate::api::endpoints::with_db;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::crypto::SessionClaims;
use crate::db;
use crate::models::enums::UserStatus;

/// Require a valid session token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
/// On success: injects `AuthUser` and adds `Cache-Control: no-store`.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = ctx.core.verify_session(token).map_err(ApiError::from)?;
    let claims = with_db(&ctx, move |_, conn| {
        let record = db::get_user(conn, &claims.sub)?.ok_or(ApiError::Unauthorized)?;
        match record.status {
            UserStatus::Active => {}
            UserStatus::Pending => return Err(AccountError::AccountPending.into()),
            UserStatus::Suspended => return Err(AccountError::AccountSuspended.into()),
        }
        // Stored role and name win over what the token was issued with
        Ok(SessionClaims {
            role: record.role,
            name: record.name,
            email: record.email,
            ..claims
        })
    })
    .await?;

    req.extensions_mut().insert(AuthUser { claims });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));

    Ok(response)
}
