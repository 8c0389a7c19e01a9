//! Profile endpoints.
//!
//! - `GET /api/profile`: the caller's account
//! - `PUT /api/profile`: edit personal details
//! - `POST /api/profile/password`: change password

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::accounts::{self, AccountError};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db;
use crate::models::{ProfileUpdate, UserProfile};

/// `GET /api/profile`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = super::with_db(&ctx, move |_, conn| {
        let record = db::get_user(conn, &user.id())?.ok_or(AccountError::NotFound)?;
        Ok(UserProfile::from(&record))
    })
    .await?;
    Ok(Json(profile))
}

/// `PUT /api/profile`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = super::with_db(&ctx, move |_, conn| {
        let record = accounts::update_profile(conn, &user.id(), update)?;
        Ok(UserProfile::from(&record))
    })
    .await?;
    Ok(Json(profile))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// `POST /api/profile/password`
pub async fn change_password(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    super::with_db(&ctx, move |core, conn| {
        accounts::change_password(
            conn,
            &user.id(),
            &request.current_password,
            &request.new_password,
            core.config().password_iterations,
        )?;
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
