//! Weighted symptom-to-diagnosis analysis.
//!
//! Questionnaire answers are scored against each condition of the module
//! (see `weighting`), producing a rule-based provisional diagnosis. When an
//! LLM is available the result is refined by it; any LLM failure falls back
//! to the rule-based result, so analysis of valid input never fails.

pub mod ollama;
pub mod parser;
pub mod prompt;
pub mod weighting;

pub use ollama::{LlmClient, MockLlmClient, OllamaClient};
pub use weighting::{rule_based_analysis, validate_responses};

use thiserror::Error;

use crate::models::enums::{AnalysisSource, RiskLevel};
use crate::models::{DiagnosticModule, SymptomResponse, WeightedAnalysis};
use parser::AiAssessment;

#[derive(Error, Debug, PartialEq)]
pub enum AnalysisError {
    #[error("No responses submitted")]
    EmptyResponses,

    #[error("Unknown question: {0}")]
    UnknownQuestion(String),

    #[error("Question answered more than once: {0}")]
    DuplicateAnswer(String),

    #[error("Unknown option '{value}' for question {question}")]
    UnknownOption { question: String, value: String },

    #[error("Invalid answer for question {question}: {reason}")]
    InvalidAnswer { question: String, reason: String },

    #[error("Required question not answered: {0}")]
    MissingRequired(String),

    #[error("AI service is not reachable at {0}")]
    AiConnection(String),

    #[error("AI service returned error (status {status}): {body}")]
    AiStatus { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed AI response: {0}")]
    MalformedResponse(String),
}

impl AnalysisError {
    /// True for errors caused by the submitted answers rather than the AI call.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::EmptyResponses
                | Self::UnknownQuestion(_)
                | Self::DuplicateAnswer(_)
                | Self::UnknownOption { .. }
                | Self::InvalidAnswer { .. }
                | Self::MissingRequired(_)
        )
    }
}

/// Validate, weight and (optionally) refine with the LLM.
///
/// Only input validation errors are returned; LLM failures are logged and
/// the rule-based result is used instead.
pub fn weighted_ai_analysis(
    module: &DiagnosticModule,
    responses: &[SymptomResponse],
    llm: Option<(&dyn LlmClient, &str)>,
) -> Result<WeightedAnalysis, AnalysisError> {
    validate_responses(module, responses)?;
    let rule_based = rule_based_analysis(module, responses);

    let Some((client, model)) = llm else {
        return Ok(rule_based);
    };

    let user_prompt = prompt::build_analysis_prompt(module, responses, &rule_based);
    let refined = client
        .generate(model, &user_prompt, prompt::ANALYSIS_SYSTEM_PROMPT)
        .and_then(|reply| parser::parse_ai_reply(&reply));

    match refined {
        Ok(ai) => {
            tracing::info!(module = %module.name, model, "AI analysis merged");
            Ok(merge_ai_assessment(module, rule_based, ai, model))
        }
        Err(e) => {
            tracing::warn!(module = %module.name, error = %e, "AI analysis failed; using rule-based result");
            Ok(rule_based)
        }
    }
}

/// Adopt the AI's diagnosis, reasoning and recommendations while keeping
/// the weighted differential and red flags. Red flags pin risk to critical.
fn merge_ai_assessment(
    module: &DiagnosticModule,
    rule_based: WeightedAnalysis,
    ai: AiAssessment,
    model: &str,
) -> WeightedAnalysis {
    let confidence = ai
        .confidence_percent()
        .unwrap_or(rule_based.confidence);

    let mut risk_level = ai.risk().unwrap_or(rule_based.risk_level);
    if !rule_based.red_flags.is_empty() {
        risk_level = RiskLevel::Critical;
    }

    let diagnosis = ai
        .diagnosis
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());

    let (provisional_diagnosis, icd_code) = match diagnosis {
        Some(d) => {
            let known = module
                .conditions
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&d))
                .and_then(|c| c.icd_code.clone());
            let icd = known.or(ai.icd_code);
            (d, icd)
        }
        None => (rule_based.provisional_diagnosis.clone(), rule_based.icd_code.clone()),
    };

    let reasoning = ai
        .reasoning
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(rule_based.reasoning);
    let recommendations = if ai.recommendations.is_empty() {
        rule_based.recommendations
    } else {
        ai.recommendations
    };

    WeightedAnalysis {
        provisional_diagnosis,
        icd_code,
        confidence,
        risk_level,
        differentials: rule_based.differentials,
        red_flags: rule_based.red_flags,
        reasoning,
        recommendations,
        source: AnalysisSource::Ai,
        model: Some(model.to_string()),
        analyzed_at: rule_based.analyzed_at,
    }
}
