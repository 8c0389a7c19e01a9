//! Rule-based scoring of questionnaire answers.
//!
//! For each condition `c`:
//!
//! ```text
//! raw(c)   = Σ weight(q) × contribution(q, c)      over answered questions
//! max(c)   = Σ weight(q) × best(q, c)              over all module questions
//! score(c) = clamp(raw(c) / max(c), 0, 1)
//! ```
//!
//! Single choice contributes the chosen option's score, multi choice the
//! sum of chosen options, scale `scale_scores[c] × value / 10`.

use std::collections::{BTreeMap, HashSet};

use crate::models::enums::{AnalysisSource, QuestionKind, RiskLevel};
use crate::models::{Answer, ConditionScore, DiagnosticModule, Question, SymptomResponse, WeightedAnalysis};

use super::AnalysisError;

/// Below this top score no condition is proposed.
pub const MIN_SUPPORT: f64 = 0.25;
/// At or above this top score the condition's full severity applies.
pub const STRONG_SUPPORT: f64 = 0.6;
pub const MAX_SCALE: u8 = 10;
pub const INCONCLUSIVE: &str = "Inconclusive (clinician review required)";

/// Check the answers against the module's questionnaire.
pub fn validate_responses(module: &DiagnosticModule, responses: &[SymptomResponse]) -> Result<(), AnalysisError> {
    if responses.is_empty() {
        return Err(AnalysisError::EmptyResponses);
    }

    let mut seen = HashSet::new();
    for response in responses {
        let question = module
            .question(&response.question_id)
            .ok_or_else(|| AnalysisError::UnknownQuestion(response.question_id.clone()))?;
        if !seen.insert(question.id.as_str()) {
            return Err(AnalysisError::DuplicateAnswer(question.id.clone()));
        }
        validate_answer(question, &response.answer)?;
    }

    if let Some(missing) = module
        .questions
        .iter()
        .find(|q| q.required && !seen.contains(q.id.as_str()))
    {
        return Err(AnalysisError::MissingRequired(missing.id.clone()));
    }
    Ok(())
}

fn validate_answer(question: &Question, answer: &Answer) -> Result<(), AnalysisError> {
    let invalid = |reason: &str| AnalysisError::InvalidAnswer {
        question: question.id.clone(),
        reason: reason.to_string(),
    };
    let known = |value: &str| {
        question
            .option(value)
            .map(|_| ())
            .ok_or_else(|| AnalysisError::UnknownOption {
                question: question.id.clone(),
                value: value.to_string(),
            })
    };

    match (question.kind, answer) {
        (QuestionKind::SingleChoice, Answer::Choice(value)) => known(value),
        (QuestionKind::SingleChoice, _) => Err(invalid("expected one option")),
        (QuestionKind::MultiChoice, Answer::Choice(value)) => known(value),
        (QuestionKind::MultiChoice, Answer::Choices(values)) => {
            if values.is_empty() {
                return Err(invalid("select at least one option"));
            }
            let mut unique = HashSet::new();
            for value in values {
                if !unique.insert(value.as_str()) {
                    return Err(invalid("option selected twice"));
                }
                known(value)?;
            }
            Ok(())
        }
        (QuestionKind::MultiChoice, Answer::Scale(_)) => Err(invalid("expected options")),
        (QuestionKind::Scale, Answer::Scale(v)) if *v <= MAX_SCALE => Ok(()),
        (QuestionKind::Scale, Answer::Scale(_)) => Err(invalid("scale value must be 0-10")),
        (QuestionKind::Scale, _) => Err(invalid("expected a scale value")),
    }
}

fn chosen_values(answer: &Answer) -> Vec<&str> {
    match answer {
        Answer::Choice(v) => vec![v.as_str()],
        Answer::Choices(vs) => vs.iter().map(String::as_str).collect(),
        Answer::Scale(_) => vec![],
    }
}

fn contribution(question: &Question, answer: &Answer, condition: &str) -> f64 {
    match (question.kind, answer) {
        (QuestionKind::Scale, Answer::Scale(v)) => {
            question.scale_scores.get(condition).copied().unwrap_or(0.0) * f64::from(*v)
                / f64::from(MAX_SCALE)
        }
        _ => chosen_values(answer)
            .into_iter()
            .filter_map(|value| question.option(value))
            .map(|o| o.scores.get(condition).copied().unwrap_or(0.0))
            .sum(),
    }
}

fn best_contribution(question: &Question, condition: &str) -> f64 {
    let score_of = |scores: &BTreeMap<String, f64>| scores.get(condition).copied().unwrap_or(0.0).max(0.0);
    match question.kind {
        QuestionKind::SingleChoice => question
            .options
            .iter()
            .map(|o| score_of(&o.scores))
            .fold(0.0, f64::max),
        QuestionKind::MultiChoice => question.options.iter().map(|o| score_of(&o.scores)).sum(),
        QuestionKind::Scale => score_of(&question.scale_scores),
    }
}

/// Normalized score per condition, highest first, ties broken by name.
pub fn score_conditions(module: &DiagnosticModule, responses: &[SymptomResponse]) -> Vec<ConditionScore> {
    let mut scores: Vec<ConditionScore> = module
        .conditions
        .iter()
        .map(|condition| {
            let raw: f64 = responses
                .iter()
                .filter_map(|r| module.question(&r.question_id).map(|q| (q, &r.answer)))
                .map(|(q, answer)| q.weight * contribution(q, answer, &condition.id))
                .sum();
            let max: f64 = module
                .questions
                .iter()
                .map(|q| q.weight * best_contribution(q, &condition.id))
                .sum();
            let score = if max > 0.0 { (raw / max).clamp(0.0, 1.0) } else { 0.0 };
            ConditionScore {
                condition_id: condition.id.clone(),
                name: condition.name.clone(),
                icd_code: condition.icd_code.clone(),
                score,
            }
        })
        .collect();

    scores.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    scores
}

/// Answers that warrant urgent attention regardless of the score.
pub fn collect_red_flags(module: &DiagnosticModule, responses: &[SymptomResponse]) -> Vec<String> {
    let mut flags = Vec::new();
    for response in responses {
        let Some(question) = module.question(&response.question_id) else {
            continue;
        };
        match &response.answer {
            Answer::Scale(v) => {
                if question.red_flag_at.is_some_and(|at| *v >= at) {
                    flags.push(format!("{} ({v}/10)", question.prompt));
                }
            }
            answer => {
                for value in chosen_values(answer) {
                    if let Some(option) = question.option(value).filter(|o| o.red_flag) {
                        flags.push(option.label.clone());
                    }
                }
            }
        }
    }
    flags
}

/// `100 × (0.7 × top + 0.3 × margin) × (0.5 + 0.5 × completeness)`, rounded.
pub fn confidence(top: f64, second: f64, answered: usize, total: usize) -> u8 {
    let completeness = if total == 0 {
        0.0
    } else {
        (answered as f64 / total as f64).min(1.0)
    };
    let margin = (top - second).max(0.0);
    let value = 100.0 * (0.7 * top + 0.3 * margin) * (0.5 + 0.5 * completeness);
    value.round().clamp(0.0, 100.0) as u8
}

/// Score the (already validated) answers without any external call.
pub fn rule_based_analysis(module: &DiagnosticModule, responses: &[SymptomResponse]) -> WeightedAnalysis {
    let ranked = score_conditions(module, responses);
    let red_flags = collect_red_flags(module, responses);

    let top = ranked.first().map(|c| c.score).unwrap_or(0.0);
    let second = ranked.get(1).map(|c| c.score).unwrap_or(0.0);
    let conclusive = ranked.first().filter(|c| c.score >= MIN_SUPPORT);
    let rule = conclusive.and_then(|c| module.condition(&c.condition_id));

    let mut risk_level = match rule {
        Some(rule) if top >= STRONG_SUPPORT => rule.severity,
        Some(rule) => rule.severity.downgraded(),
        None => RiskLevel::Low,
    };
    if !red_flags.is_empty() {
        risk_level = RiskLevel::Critical;
    }

    let answered = responses.len();
    let total = module.questions.len();
    let reasoning = match conclusive {
        Some(best) => {
            let runner_up = ranked
                .get(1)
                .filter(|c| c.score > 0.0)
                .map(|c| format!("; next most likely: {} ({:.2})", c.name, c.score))
                .unwrap_or_default();
            format!(
                "Weighted symptom score {:.2} for {} from {answered} of {total} questions{runner_up}.",
                best.score, best.name
            )
        }
        None => format!(
            "No condition reached the minimum weighted support of {MIN_SUPPORT:.2} \
             from {answered} of {total} questions."
        ),
    };

    let mut recommendations = Vec::new();
    if !red_flags.is_empty() {
        recommendations.push("Seek urgent medical attention: red-flag symptoms were reported.".to_string());
    }
    if let Some(rule) = rule.filter(|r| !r.advice.is_empty()) {
        recommendations.push(rule.advice.clone());
    }
    recommendations.push("A clinician will review this assessment.".to_string());

    WeightedAnalysis {
        provisional_diagnosis: conclusive
            .map(|c| c.name.clone())
            .unwrap_or_else(|| INCONCLUSIVE.to_string()),
        icd_code: conclusive.and_then(|c| c.icd_code.clone()),
        confidence: confidence(top, second, answered, total),
        risk_level,
        differentials: ranked.iter().filter(|c| c.score > 0.0).cloned().collect(),
        red_flags,
        reasoning,
        recommendations,
        source: AnalysisSource::RuleBased,
        model: None,
        analyzed_at: crate::db::now(),
    }
}
