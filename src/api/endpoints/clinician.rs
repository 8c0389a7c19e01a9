//! Clinician portal: patient directory.
//!
//! - `GET /api/clinician/patients`: patients with assessment roll-ups
//! - `GET /api/clinician/patients/:id`: one patient and their history

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};
use crate::db::{self, AssessmentFilter, PatientSummary};
use crate::models::enums::Role;
use crate::models::{AssessmentSummary, UserProfile};

const STAFF: &[Role] = &[Role::Clinician, Role::Admin];

/// `GET /api/clinician/patients`
pub async fn patients(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<PatientSummary>>, ApiError> {
    user.require_role(STAFF)?;
    let rows = super::with_db(&ctx, |_, conn| Ok(db::patient_summaries(conn)?)).await?;
    Ok(Json(rows))
}

#[derive(Serialize)]
pub struct PatientDetail {
    pub profile: UserProfile,
    pub assessments: Vec<AssessmentSummary>,
}

/// `GET /api/clinician/patients/:id`
pub async fn patient_detail(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(patient_id): Path<String>,
) -> Result<Json<PatientDetail>, ApiError> {
    user.require_role(STAFF)?;
    let id = super::parse_id(&patient_id, "patient")?;
    let detail = super::with_db(&ctx, move |_, conn| {
        let patient = db::get_user(conn, &id)?
            .filter(|u| u.role == Role::Patient)
            .ok_or_else(|| ApiError::NotFound("Patient not found".into()))?;
        let assessments = db::list_assessment_summaries(
            conn,
            &AssessmentFilter {
                patient_id: Some(id),
                ..Default::default()
            },
        )?;
        Ok(PatientDetail {
            profile: UserProfile::from(&patient),
            assessments,
        })
    })
    .await?;
    Ok(Json(detail))
}
