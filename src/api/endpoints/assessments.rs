//! Assessment endpoints.
//!
//! - `POST /api/assessments`: patient submits answers (analysed on submit)
//! - `GET /api/assessments`: patient: own; staff: all, with filters
//! - `GET /api/assessments/:id`
//! - `POST /api/assessments/:id/claim`: clinician takes it for review
//! - `POST /api/assessments/:id/review`: clinician records the outcome

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::assessments::{self, ReviewInput, SubmitInput};
use crate::db::AssessmentFilter;
use crate::models::enums::{AssessmentStatus, Role, RiskLevel};
use crate::models::{AssessmentSummary, DiagnosisSession};

/// `POST /api/assessments`
///
/// The AI call happens inside the blocking task, so a slow model never
/// stalls the runtime.
pub async fn submit(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Json(input): Json<SubmitInput>,
) -> Result<(StatusCode, Json<DiagnosisSession>), ApiError> {
    user.require_role(&[Role::Patient])?;
    let llm = ctx.core.llm();
    let model = ctx.core.config().ai.model.clone();

    let session = super::with_db(&ctx, move |_, conn| {
        let ai = llm.as_deref().map(|client| (client, model.as_str()));
        Ok(assessments::submit(conn, ai, &user.actor(), input)?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Deserialize)]
pub struct AssessmentQuery {
    pub status: Option<AssessmentStatus>,
    pub risk_level: Option<RiskLevel>,
    pub patient_id: Option<Uuid>,
    /// Only assessments claimed or reviewed by the calling clinician.
    pub mine: Option<bool>,
    pub limit: Option<u32>,
}

/// `GET /api/assessments`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AssessmentQuery>,
) -> Result<Json<Vec<AssessmentSummary>>, ApiError> {
    let filter = AssessmentFilter {
        patient_id: query.patient_id,
        clinician_id: query.mine.unwrap_or(false).then(|| user.id()),
        status: query.status,
        risk_level: query.risk_level,
        limit: Some(super::page_limit(query.limit, 50, 200)),
    };
    let summaries = super::with_db(&ctx, move |_, conn| {
        Ok(assessments::list_visible(conn, &user.actor(), filter)?)
    })
    .await?;
    Ok(Json(summaries))
}

/// `GET /api/assessments/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(assessment_id): Path<String>,
) -> Result<Json<DiagnosisSession>, ApiError> {
    let id = super::parse_id(&assessment_id, "assessment")?;
    let session = super::with_db(&ctx, move |_, conn| {
        Ok(assessments::get_visible(conn, &user.actor(), &id)?)
    })
    .await?;
    Ok(Json(session))
}

/// `POST /api/assessments/:id/claim`
pub async fn claim(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(assessment_id): Path<String>,
) -> Result<Json<DiagnosisSession>, ApiError> {
    let id = super::parse_id(&assessment_id, "assessment")?;
    user.require_role(&[Role::Clinician])?;
    let session = super::with_db(&ctx, move |_, conn| {
        Ok(assessments::claim(conn, &user.actor(), &id)?)
    })
    .await?;
    Ok(Json(session))
}

/// `POST /api/assessments/:id/review`
pub async fn review(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(assessment_id): Path<String>,
    Json(input): Json<ReviewInput>,
) -> Result<Json<DiagnosisSession>, ApiError> {
    let id = super::parse_id(&assessment_id, "assessment")?;
    user.require_role(&[Role::Clinician])?;
    let session = super::with_db(&ctx, move |_, conn| {
        Ok(assessments::review(conn, &user.actor(), &id, input)?)
    })
    .await?;
    Ok(Json(session))
}
