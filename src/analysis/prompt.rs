use crate::models::{Answer, DiagnosticModule, SymptomResponse, WeightedAnalysis};

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"
You are a clinical decision-support assistant helping triage a patient's
structured symptom questionnaire. Your output is a PROVISIONAL suggestion
that a licensed clinician will review before anything reaches the patient
as a diagnosis.

RULES:
1. Base your answer ONLY on the questionnaire answers and weighted scores given.
2. Prefer one of the listed candidate conditions unless the answers clearly
   point elsewhere.
3. Never lower urgency when red-flag symptoms are listed.
4. Recommendations must be short, practical and safe for a patient to read.
5. Output ONLY a single JSON object, no prose before or after it.
"#;

fn describe_answer(module: &DiagnosticModule, response: &SymptomResponse) -> String {
    let question = module.question(&response.question_id);
    let label = |value: &str| {
        question
            .and_then(|q| q.option(value))
            .map(|o| o.label.clone())
            .unwrap_or_else(|| value.to_string())
    };
    match &response.answer {
        Answer::Choice(value) => label(value),
        Answer::Choices(values) => values.iter().map(|v| label(v)).collect::<Vec<_>>().join(", "),
        Answer::Scale(v) => format!("{v}/10"),
    }
}

/// Build the refinement prompt. Answers are rendered as option labels; no
/// patient identifiers are included.
pub fn build_analysis_prompt(
    module: &DiagnosticModule,
    responses: &[SymptomResponse],
    rule_based: &WeightedAnalysis,
) -> String {
    let answers: String = responses
        .iter()
        .map(|r| {
            let prompt = module
                .question(&r.question_id)
                .map(|q| q.prompt.as_str())
                .unwrap_or(r.question_id.as_str());
            format!("- {prompt} {}\n", describe_answer(module, r))
        })
        .collect();

    let candidates: String = module
        .conditions
        .iter()
        .map(|c| {
            let score = rule_based
                .differentials
                .iter()
                .find(|d| d.condition_id == c.id)
                .map(|d| d.score)
                .unwrap_or(0.0);
            let icd = c.icd_code.as_deref().unwrap_or("n/a");
            format!("- {} (ICD-10 {icd}, severity {}): weighted score {score:.2}\n", c.name, c.severity)
        })
        .collect();

    let red_flags = if rule_based.red_flags.is_empty() {
        "none".to_string()
    } else {
        rule_based.red_flags.join("; ")
    };

    format!(
        r#"Body region: {region}
Questionnaire: {name}

<answers>
{answers}</answers>

<candidate_conditions>
{candidates}</candidate_conditions>

Red-flag symptoms: {red_flags}
Rule-based provisional diagnosis: {provisional} (confidence {confidence}/100, risk {risk})

Respond with this JSON structure:
{{
  "diagnosis": "most likely condition name",
  "icd_code": "ICD-10 code or null",
  "confidence": 0-100,
  "risk_level": "low | moderate | high | critical",
  "reasoning": "one or two sentences",
  "recommendations": ["short recommendation", "..."]
}}"#,
        region = module.body_region,
        name = module.name,
        provisional = rule_based.provisional_diagnosis,
        confidence = rule_based.confidence,
        risk = rule_based.risk_level,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::weighting::rule_based_analysis;
    use crate::test_support::{module_fixture, responses};

    #[test]
    fn prompt_uses_labels_and_scores() {
        let module = module_fixture();
        let answers = responses(vec![
            ("location", Answer::Choice("one_side".into())),
            ("features", Answer::Choices(vec!["nausea".into(), "stiff_neck".into()])),
            ("severity", Answer::Scale(7)),
        ]);
        let rule_based = rule_based_analysis(&module, &answers);
        let prompt = build_analysis_prompt(&module, &answers, &rule_based);

        assert!(prompt.contains("Where is the pain? One side"));
        assert!(prompt.contains("Nausea, Stiff neck with fever"));
        assert!(prompt.contains("7/10"));
        assert!(prompt.contains("Meningitis (ICD-10 G03, severity critical)"));
        assert!(prompt.contains("Red-flag symptoms: Stiff neck with fever"));
        assert!(!prompt.contains("one_side"));
    }

    #[test]
    fn system_prompt_requires_json_only() {
        assert!(ANALYSIS_SYSTEM_PROMPT.contains("ONLY a single JSON object"));
        assert!(ANALYSIS_SYSTEM_PROMPT.contains("clinician will review"));
    }
}
