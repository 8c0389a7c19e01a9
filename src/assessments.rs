//! Assessment lifecycle: submission, clinician claim and review.
//!
//! ```text
//! pending_review ──claim──▶ in_review ──review──▶ reviewed (terminal)
//!        └──────────review──────────────┘   └──▶ follow_up ──review──▶ …
//! ```
//!
//! All functions block (SQLite, and the LLM call during submission).

use rusqlite::Connection;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::analysis::{self, AnalysisError, LlmClient};
use crate::db::{self, AssessmentFilter, DatabaseError};
use crate::models::enums::{AssessmentStatus, Role};
use crate::models::{Actor, AssessmentSummary, DiagnosisSession, SymptomResponse};
use crate::notifications;

pub const MAX_ATTACHMENTS: usize = 10;
const MAX_URL_LENGTH: usize = 2048;
const MAX_DIAGNOSIS_LENGTH: usize = 500;
const MAX_NOTES_LENGTH: usize = 5000;

#[derive(Error, Debug)]
pub enum AssessmentError {
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Assessment not found")]
    NotFound,

    #[error("Diagnostic module not found")]
    ModuleNotFound,

    #[error("Diagnostic module is not active")]
    ModuleInactive,

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(&'static str),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitInput {
    pub module_id: Uuid,
    pub responses: Vec<SymptomResponse>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewInput {
    pub final_diagnosis: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub follow_up: bool,
}

fn validate_attachments(attachments: &[String]) -> Result<(), AssessmentError> {
    if attachments.len() > MAX_ATTACHMENTS {
        return Err(AssessmentError::InvalidInput(format!(
            "At most {MAX_ATTACHMENTS} attachments are allowed"
        )));
    }
    for url in attachments {
        let url = url.trim();
        if url.is_empty() || url.len() > MAX_URL_LENGTH || url.chars().any(char::is_whitespace) {
            return Err(AssessmentError::InvalidInput("Attachment URL is invalid".into()));
        }
    }
    Ok(())
}

/// Analyse and store a patient's answers, then notify reviewers.
pub fn submit(
    conn: &Connection,
    llm: Option<(&dyn LlmClient, &str)>,
    patient: &Actor,
    input: SubmitInput,
) -> Result<DiagnosisSession, AssessmentError> {
    if patient.role != Role::Patient {
        return Err(AssessmentError::Forbidden("Only patients can submit assessments"));
    }
    validate_attachments(&input.attachments)?;

    let module = db::get_module(conn, &input.module_id)?.ok_or(AssessmentError::ModuleNotFound)?;
    if !module.active {
        return Err(AssessmentError::ModuleInactive);
    }

    let analysis = analysis::weighted_ai_analysis(&module, &input.responses, llm)?;

    let ts = db::now();
    let session = DiagnosisSession {
        id: Uuid::new_v4(),
        patient_id: patient.id,
        module_id: module.id,
        body_region: module.body_region.clone(),
        responses: input.responses,
        provisional_diagnosis: analysis.provisional_diagnosis.clone(),
        confidence: analysis.confidence,
        risk_level: analysis.risk_level,
        analysis,
        status: AssessmentStatus::PendingReview,
        clinician_id: None,
        clinician_notes: None,
        final_diagnosis: None,
        attachments: input.attachments.into_iter().map(|u| u.trim().to_string()).collect(),
        created_at: ts,
        updated_at: ts,
        reviewed_at: None,
    };
    db::insert_assessment(conn, &session)?;
    tracing::info!(
        assessment_id = %session.id,
        module = %module.name,
        risk = %session.risk_level,
        source = %session.analysis.source,
        "Assessment submitted"
    );

    // The assessment stands even if reviewers can't be notified
    if let Err(e) = notifications::notify_submission(conn, &session, &patient.name) {
        tracing::error!(assessment_id = %session.id, error = %e, "Submission notifications failed");
    }
    Ok(session)
}

/// Patients see their own assessments; staff see all. Others' assessments
/// are reported as not found.
pub fn get_visible(conn: &Connection, viewer: &Actor, id: &Uuid) -> Result<DiagnosisSession, AssessmentError> {
    let session = db::get_assessment(conn, id)?.ok_or(AssessmentError::NotFound)?;
    if !viewer.is_staff() && session.patient_id != viewer.id {
        return Err(AssessmentError::NotFound);
    }
    Ok(session)
}

pub fn list_visible(
    conn: &Connection,
    viewer: &Actor,
    mut filter: AssessmentFilter,
) -> Result<Vec<AssessmentSummary>, AssessmentError> {
    if !viewer.is_staff() {
        filter.patient_id = Some(viewer.id);
        filter.clinician_id = None;
    }
    Ok(db::list_assessment_summaries(conn, &filter)?)
}

/// `pending_review → in_review`, recording the clinician.
pub fn claim(conn: &Connection, clinician: &Actor, id: &Uuid) -> Result<DiagnosisSession, AssessmentError> {
    if clinician.role != Role::Clinician {
        return Err(AssessmentError::Forbidden("Only clinicians can claim assessments"));
    }
    let session = db::get_assessment(conn, id)?.ok_or(AssessmentError::NotFound)?;
    if session.status != AssessmentStatus::PendingReview {
        return Err(AssessmentError::Conflict("Assessment is not awaiting review"));
    }
    if !db::claim_assessment(conn, id, &clinician.id)? {
        return Err(AssessmentError::Conflict("Assessment was claimed by another clinician"));
    }

    let session = db::get_assessment(conn, id)?.ok_or(AssessmentError::NotFound)?;
    tracing::info!(assessment_id = %id, clinician_id = %clinician.id, "Assessment claimed");
    if let Err(e) = notifications::notify_claimed(conn, &session, &clinician.name) {
        tracing::error!(assessment_id = %id, error = %e, "Claim notification failed");
    }
    Ok(session)
}

/// Record the final diagnosis. `reviewed` is terminal; `follow_up` may be
/// reviewed again. Only the claiming clinician may review a claimed assessment.
pub fn review(
    conn: &Connection,
    clinician: &Actor,
    id: &Uuid,
    input: ReviewInput,
) -> Result<DiagnosisSession, AssessmentError> {
    if clinician.role != Role::Clinician {
        return Err(AssessmentError::Forbidden("Only clinicians can review assessments"));
    }
    let final_diagnosis = input.final_diagnosis.trim();
    if final_diagnosis.is_empty() {
        return Err(AssessmentError::InvalidInput("Final diagnosis is required".into()));
    }
    if final_diagnosis.chars().count() > MAX_DIAGNOSIS_LENGTH {
        return Err(AssessmentError::InvalidInput("Final diagnosis is too long".into()));
    }
    let notes = input
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    if notes.is_some_and(|n| n.chars().count() > MAX_NOTES_LENGTH) {
        return Err(AssessmentError::InvalidInput("Notes are too long".into()));
    }

    let session = db::get_assessment(conn, id)?.ok_or(AssessmentError::NotFound)?;
    if !session.status.is_reviewable() {
        return Err(AssessmentError::Conflict("Assessment has already been reviewed"));
    }
    if session.clinician_id.is_some_and(|owner| owner != clinician.id) {
        return Err(AssessmentError::Forbidden(
            "Assessment is claimed by another clinician",
        ));
    }

    let status = if input.follow_up {
        AssessmentStatus::FollowUp
    } else {
        AssessmentStatus::Reviewed
    };
    if !db::record_review(conn, id, &clinician.id, final_diagnosis, notes, status)? {
        return Err(AssessmentError::Conflict("Assessment changed during review; reload and retry"));
    }

    let session = db::get_assessment(conn, id)?.ok_or(AssessmentError::NotFound)?;
    tracing::info!(assessment_id = %id, clinician_id = %clinician.id, status = %status, "Assessment reviewed");
    if let Err(e) = notifications::notify_reviewed(conn, &session) {
        tracing::error!(assessment_id = %id, error = %e, "Review notification failed");
    }
    Ok(session)
}
