//! `GET /api/dashboard`: role-specific page data.

use axum::extract::State;
use axum::{Extension, Json};

use crate::accounts::AccountError;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::dashboard::{self, Dashboard};
use crate::db;

pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Dashboard>, ApiError> {
    let page = super::with_db(&ctx, move |_, conn| {
        // The stored record, not the token, decides the portal
        let record = db::get_user(conn, &user.id())?.ok_or(AccountError::NotFound)?;
        Ok(dashboard::dashboard_for(conn, &record)?)
    })
    .await?;
    Ok(Json(page))
}
