//! `POST /api/uploads`: proxy a photo or document to the media host.
//!
//! Multipart field `file`; JPEG, PNG, WebP or PDF up to 5 MiB. Returns the
//! hosted URL to attach to an assessment.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::media::{self, StoredMedia};

/// Body limit for the upload route: the file plus multipart framing.
pub const UPLOAD_BODY_LIMIT: usize = media::MAX_UPLOAD_BYTES + 64 * 1024;

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::from(media::MediaError::TooLarge)
    } else {
        ApiError::BadRequest(format!("Malformed upload: {}", err.body_text()))
    }
}

pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StoredMedia>), ApiError> {
    let store = ctx
        .core
        .media_store()
        .ok_or_else(|| ApiError::ServiceUnavailable("File uploads are not configured".into()))?;

    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let declared = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        file = Some((filename, declared, bytes));
        break;
    }
    let (filename, declared, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing multipart field 'file'".into()))?;

    let content_type = media::validate_upload(&filename, declared.as_deref(), bytes.len())?;
    let size = bytes.len();

    let stored = tokio::task::spawn_blocking(move || {
        store.upload(&filename, &content_type, bytes.to_vec())
    })
    .await??;

    tracing::info!(user_id = %user.id(), size, public_id = %stored.public_id, "File uploaded");
    Ok((StatusCode::CREATED, Json(stored)))
}
