//! Notification endpoints.
//!
//! - `GET /api/notifications`: newest first, optionally unread only
//! - `GET /api/notifications/unread-count`
//! - `POST /api/notifications/:id/read`
//! - `POST /api/notifications/read-all`

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db;
use crate::models::Notification;

#[derive(Deserialize)]
pub struct NotificationQuery {
    pub unread_only: Option<bool>,
    pub limit: Option<u32>,
}

/// `GET /api/notifications`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let limit = super::page_limit(query.limit, 50, 200);
    let unread_only = query.unread_only.unwrap_or(false);
    let notifications = super::with_db(&ctx, move |_, conn| {
        Ok(db::list_notifications(conn, &user.id(), unread_only, limit)?)
    })
    .await?;
    Ok(Json(notifications))
}

#[derive(Serialize)]
pub struct UnreadCount {
    pub count: u32,
}

/// `GET /api/notifications/unread-count`
pub async fn unread_count(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UnreadCount>, ApiError> {
    let count = super::with_db(&ctx, move |_, conn| Ok(db::count_unread(conn, &user.id())?)).await?;
    Ok(Json(UnreadCount { count }))
}

/// `POST /api/notifications/:id/read`: owner only; others get 404.
pub async fn mark_read(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = super::parse_id(&notification_id, "notification")?;
    let changed = super::with_db(&ctx, move |_, conn| {
        Ok(db::mark_notification_read(conn, &id, &user.id())?)
    })
    .await?;
    if !changed {
        return Err(ApiError::NotFound("Notification not found".into()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct MarkAllResponse {
    pub updated: usize,
}

/// `POST /api/notifications/read-all`
pub async fn mark_all_read(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MarkAllResponse>, ApiError> {
    let updated = super::with_db(&ctx, move |_, conn| {
        Ok(db::mark_all_notifications_read(conn, &user.id())?)
    })
    .await?;
    Ok(Json(MarkAllResponse { updated }))
}
