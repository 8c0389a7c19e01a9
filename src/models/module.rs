use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{QuestionKind, RiskLevel};

/// A body-region questionnaire with per-answer condition weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticModule {
    pub id: Uuid,
    pub name: String,
    pub body_region: String,
    pub description: String,
    pub version: i32,
    pub questions: Vec<Question>,
    pub conditions: Vec<ConditionRule>,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub kind: QuestionKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    /// Condition scores reached at scale value 10 (scale questions only).
    #[serde(default)]
    pub scale_scores: BTreeMap<String, f64>,
    /// Scale value at or above which the answer is a red flag.
    #[serde(default)]
    pub red_flag_at: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOption {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub red_flag: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icd_code: Option<String>,
    pub severity: RiskLevel,
    #[serde(default)]
    pub advice: String,
}

fn default_weight() -> f64 {
    1.0
}

fn default_required() -> bool {
    true
}

/// Module authoring payload (admin create/update, embedded seed files).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub name: String,
    pub body_region: String,
    #[serde(default)]
    pub description: String,
    pub questions: Vec<Question>,
    pub conditions: Vec<ConditionRule>,
}

/// Compact listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub id: Uuid,
    pub name: String,
    pub body_region: String,
    pub description: String,
    pub question_count: usize,
    pub version: i32,
    pub active: bool,
}

impl DiagnosticModule {
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    pub fn condition(&self, id: &str) -> Option<&ConditionRule> {
        self.conditions.iter().find(|c| c.id == id)
    }

    pub fn summary(&self) -> ModuleSummary {
        ModuleSummary {
            id: self.id,
            name: self.name.clone(),
            body_region: self.body_region.clone(),
            description: self.description.clone(),
            question_count: self.questions.len(),
            version: self.version,
            active: self.active,
        }
    }
}

impl Question {
    pub fn option(&self, value: &str) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.value == value)
    }
}

impl ModuleDefinition {
    /// Structural checks for an authored module. Returns the first problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() || self.body_region.trim().is_empty() {
            return Err("Module name and body region are required".into());
        }
        if self.questions.is_empty() {
            return Err("A module needs at least one question".into());
        }
        if self.conditions.is_empty() {
            return Err("A module needs at least one condition".into());
        }

        let mut condition_ids = std::collections::BTreeSet::new();
        for condition in &self.conditions {
            if condition.id.trim().is_empty() || condition.name.trim().is_empty() {
                return Err("Conditions need an id and a name".into());
            }
            if !condition_ids.insert(condition.id.as_str()) {
                return Err(format!("Duplicate condition id: {}", condition.id));
            }
        }
        let check_scores = |owner: &str, scores: &BTreeMap<String, f64>| -> Result<(), String> {
            for (condition, score) in scores {
                if !condition_ids.contains(condition.as_str()) {
                    return Err(format!("{owner} scores unknown condition {condition}"));
                }
                if !(0.0..=1.0).contains(score) {
                    return Err(format!("{owner} score for {condition} must be within 0..1"));
                }
            }
            Ok(())
        };

        let mut question_ids = std::collections::BTreeSet::new();
        for question in &self.questions {
            if question.id.trim().is_empty() || question.prompt.trim().is_empty() {
                return Err("Questions need an id and a prompt".into());
            }
            if !question_ids.insert(question.id.as_str()) {
                return Err(format!("Duplicate question id: {}", question.id));
            }
            if !question.weight.is_finite() || question.weight <= 0.0 {
                return Err(format!("Question {} must have a positive weight", question.id));
            }
            match question.kind {
                QuestionKind::Scale => {
                    if !question.options.is_empty() {
                        return Err(format!("Scale question {} cannot have options", question.id));
                    }
                    if question.red_flag_at.is_some_and(|v| v > 10) {
                        return Err(format!("Question {} red flag threshold exceeds 10", question.id));
                    }
                    check_scores(&format!("Question {}", question.id), &question.scale_scores)?;
                }
                QuestionKind::SingleChoice | QuestionKind::MultiChoice => {
                    if question.options.is_empty() {
                        return Err(format!("Question {} needs at least one option", question.id));
                    }
                    let mut values = std::collections::BTreeSet::new();
                    for option in &question.options {
                        if !values.insert(option.value.as_str()) {
                            return Err(format!(
                                "Question {} repeats option {}",
                                question.id, option.value
                            ));
                        }
                        check_scores(&format!("Option {}.{}", question.id, option.value), &option.scores)?;
                    }
                }
            }
        }
        Ok(())
    }
}
