use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AnalysisSource, AssessmentStatus, RiskLevel};

/// One answered question from a symptom questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomResponse {
    pub question_id: String,
    pub answer: Answer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Choice(String),
    Choices(Vec<String>),
    Scale(u8),
}

/// Per-condition weighted score, 0.0–1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionScore {
    pub condition_id: String,
    pub name: String,
    pub icd_code: Option<String>,
    pub score: f64,
}

/// Outcome of the weighted symptom analysis attached to an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedAnalysis {
    pub provisional_diagnosis: String,
    pub icd_code: Option<String>,
    /// 0–100.
    pub confidence: u8,
    pub risk_level: RiskLevel,
    pub differentials: Vec<ConditionScore>,
    pub red_flags: Vec<String>,
    pub reasoning: String,
    pub recommendations: Vec<String>,
    pub source: AnalysisSource,
    pub model: Option<String>,
    pub analyzed_at: NaiveDateTime,
}

/// A patient's submitted assessment (diagnosis session).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisSession {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub module_id: Uuid,
    pub body_region: String,
    pub responses: Vec<SymptomResponse>,
    pub analysis: WeightedAnalysis,
    pub provisional_diagnosis: String,
    pub confidence: u8,
    pub risk_level: RiskLevel,
    pub status: AssessmentStatus,
    pub clinician_id: Option<Uuid>,
    pub clinician_notes: Option<String>,
    pub final_diagnosis: Option<String>,
    pub attachments: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub reviewed_at: Option<NaiveDateTime>,
}

/// List row for queues and histories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentSummary {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub module_name: String,
    pub body_region: String,
    pub provisional_diagnosis: String,
    pub confidence: u8,
    pub risk_level: RiskLevel,
    pub status: AssessmentStatus,
    pub clinician_id: Option<Uuid>,
    pub final_diagnosis: Option<String>,
    pub created_at: NaiveDateTime,
}
