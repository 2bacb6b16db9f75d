//! The evaluation data contract.
//!
//! An [`EvaluationResult`] is created fresh per request, is immutable once
//! produced, and is consumed read-only by the report writers. Nothing is
//! persisted across requests.

use schemars::JsonSchema;

use crate::{error::EvalError, prelude::*};

/// A validated request to evaluate one essay.
///
/// Construction enforces the pipeline's input invariants, so downstream code
/// never sees blank text or a zero scale.
#[derive(Clone, Debug)]
pub struct EvaluationRequest {
    essay_text: String,
    scale_max: u32,
}

impl EvaluationRequest {
    /// The default upper bound for criterion scores.
    pub const DEFAULT_SCALE_MAX: u32 = 10;

    /// Create a new request.
    ///
    /// Fails with [`EvalError::EmptyInput`] for blank text, and with
    /// [`EvalError::InvalidScale`] for a zero `scale_max`. These are the only
    /// user-facing rejections in the pipeline.
    pub fn new(essay_text: impl Into<String>, scale_max: u32) -> Result<Self, EvalError> {
        let essay_text = essay_text.into();
        if essay_text.trim().is_empty() {
            return Err(EvalError::EmptyInput);
        }
        if scale_max == 0 {
            return Err(EvalError::InvalidScale(scale_max));
        }
        Ok(Self {
            essay_text,
            scale_max,
        })
    }

    /// The essay to evaluate. Guaranteed non-blank.
    pub fn essay_text(&self) -> &str {
        &self.essay_text
    }

    /// The upper bound of each criterion score. Guaranteed at least 1.
    pub fn scale_max(&self) -> u32 {
        self.scale_max
    }
}

/// One named, scored dimension of essay quality.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, JsonSchema, Serialize)]
pub struct Criterion {
    /// A short label, e.g. "Grammar & Mechanics".
    pub name: String,

    /// A score in `[1, scale_max]`. Always clamped into range.
    pub score: u32,

    /// A short free-text justification.
    pub explanation: String,
}

/// Where an evaluation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, JsonSchema, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationSource {
    /// Scored by the external LLM service.
    ExternalService,

    /// Scored by the deterministic heuristic evaluator.
    FallbackHeuristic,
}

/// The normalized evaluation record consumed by presentation and export.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, JsonSchema, Serialize)]
pub struct EvaluationResult {
    /// Scored criteria, in presentation order.
    pub criteria: Vec<Criterion>,

    /// The corrected essay. Identical to the input when no correction was
    /// attempted (always the case for fallback results).
    pub corrected_essay: String,

    /// A short overall analysis.
    pub summary: String,

    /// Sentence-level commentary, when available.
    pub explanations: String,

    /// Provenance of this result.
    pub source: EvaluationSource,
}

/// Flat score fields produced by older revisions of the evaluation prompt.
/// The canonical response shape is the `criteria` list; these are only
/// recognized on input, never produced.
const FLAT_SCORE_KEYS: &[(&str, &str)] = &[
    ("grammar", "Grammar"),
    ("spelling", "Spelling"),
    ("vocabulary", "Vocabulary"),
    ("coherence", "Coherence"),
    ("structure", "Structure"),
];

impl EvaluationResult {
    /// Coerce an extracted JSON object into a well-formed result.
    ///
    /// This is deliberately lenient: criteria entries missing a name or score
    /// are skipped, fractional scores are rounded, out-of-range scores are
    /// clamped, and a missing `corrected_essay` defaults to the unmodified
    /// input. An object which yields no criteria at all is rejected as
    /// [`EvalError::MalformedResponse`].
    pub fn from_extracted(
        value: &Value,
        request: &EvaluationRequest,
    ) -> Result<Self, EvalError> {
        let obj = value.as_object().ok_or(EvalError::MalformedResponse)?;

        let mut criteria = Vec::new();
        if let Some(items) = obj.get("criteria").and_then(Value::as_array) {
            for item in items {
                let Some(item) = item.as_object() else {
                    continue;
                };
                let Some(name) = item.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let Some(score) = item.get("score").and_then(Value::as_f64) else {
                    continue;
                };
                let explanation = item
                    .get("explanation")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                criteria.push(Criterion {
                    name: name.to_owned(),
                    score: clamp_score(score, request.scale_max()),
                    explanation: explanation.to_owned(),
                });
            }
        }

        // Legacy flat shape: lift top-level named scores into criteria.
        if criteria.is_empty() {
            for (key, label) in FLAT_SCORE_KEYS {
                if let Some(score) = obj.get(*key).and_then(Value::as_f64) {
                    criteria.push(Criterion {
                        name: (*label).to_owned(),
                        score: clamp_score(score, request.scale_max()),
                        explanation: String::new(),
                    });
                }
            }
        }

        if criteria.is_empty() {
            return Err(EvalError::MalformedResponse);
        }

        let get_str = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_owned);
        Ok(Self {
            criteria,
            corrected_essay: get_str("corrected_essay")
                .unwrap_or_else(|| request.essay_text().to_owned()),
            summary: get_str("summary").unwrap_or_default(),
            explanations: get_str("explanations").unwrap_or_default(),
            source: EvaluationSource::ExternalService,
        })
    }
}

/// A response in the canonical shape, as guaranteed by schema validation.
#[derive(Debug, Deserialize)]
struct CanonicalResponse {
    criteria: Vec<CanonicalCriterion>,
    corrected_essay: String,
    summary: String,
    explanations: String,
}

/// A criterion as the model reports it. Scores arrive as arbitrary numbers
/// and are clamped during conversion.
#[derive(Debug, Deserialize)]
struct CanonicalCriterion {
    name: String,
    score: f64,
    explanation: String,
}

impl EvaluationResult {
    /// Convert a schema-validated response into a well-formed result.
    ///
    /// The caller has already checked the value against the canonical
    /// response schema, so this is a strict typed conversion: every field
    /// must be present and correctly shaped. Scores are still clamped into
    /// `[1, scale_max]`, and a criteria list that validates but is empty is
    /// rejected as [`EvalError::MalformedResponse`].
    pub fn from_canonical(
        value: &Value,
        request: &EvaluationRequest,
    ) -> Result<Self, EvalError> {
        let response: CanonicalResponse = serde_json::from_value(value.clone())
            .map_err(|_| EvalError::MalformedResponse)?;
        if response.criteria.is_empty() {
            return Err(EvalError::MalformedResponse);
        }
        Ok(Self {
            criteria: response
                .criteria
                .into_iter()
                .map(|c| Criterion {
                    name: c.name,
                    score: clamp_score(c.score, request.scale_max()),
                    explanation: c.explanation,
                })
                .collect(),
            corrected_essay: response.corrected_essay,
            summary: response.summary,
            explanations: response.explanations,
            source: EvaluationSource::ExternalService,
        })
    }
}

/// Clamp a raw score into `[1, scale_max]`, rounding fractional values.
/// Non-finite values collapse to the minimum.
pub(crate) fn clamp_score(raw: f64, scale_max: u32) -> u32 {
    if !raw.is_finite() {
        return 1;
    }
    (raw.round() as i64).clamp(1, i64::from(scale_max)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EvaluationRequest {
        EvaluationRequest::new("A short essay.", 10).unwrap()
    }

    #[test]
    fn rejects_blank_essay() {
        assert!(matches!(
            EvaluationRequest::new("   \n\t", 10),
            Err(EvalError::EmptyInput)
        ));
    }

    #[test]
    fn rejects_zero_scale() {
        assert!(matches!(
            EvaluationRequest::new("text", 0),
            Err(EvalError::InvalidScale(0))
        ));
    }

    #[test]
    fn coerces_canonical_criteria_list() {
        let value = json!({
            "criteria": [
                { "name": "Clarity", "score": 8, "explanation": "Clear throughout." },
                { "name": "Grammar", "score": 6.4, "explanation": "A few slips." },
            ],
            "corrected_essay": "A short essay!",
            "summary": "Solid.",
            "explanations": "Sentence one is fine.",
        });
        let result = EvaluationResult::from_extracted(&value, &request()).unwrap();
        assert_eq!(result.criteria.len(), 2);
        assert_eq!(result.criteria[0].score, 8);
        assert_eq!(result.criteria[1].score, 6);
        assert_eq!(result.corrected_essay, "A short essay!");
        assert_eq!(result.source, EvaluationSource::ExternalService);
    }

    #[test]
    fn lifts_legacy_flat_scores_into_criteria() {
        let value = json!({ "grammar": 8, "vocabulary": 7, "coherence": 12 });
        let result = EvaluationResult::from_extracted(&value, &request()).unwrap();
        let names: Vec<_> = result.criteria.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Grammar", "Vocabulary", "Coherence"]);
        // Out-of-scale scores are clamped, not rejected.
        assert_eq!(result.criteria[2].score, 10);
        // No corrected essay in the reply, so the input is carried through.
        assert_eq!(result.corrected_essay, "A short essay.");
    }

    #[test]
    fn skips_malformed_criteria_entries() {
        let value = json!({
            "criteria": [
                { "name": "Clarity", "score": 5, "explanation": "ok" },
                { "name": "No score" },
                { "score": 3 },
                "not an object",
            ],
        });
        let result = EvaluationResult::from_extracted(&value, &request()).unwrap();
        assert_eq!(result.criteria.len(), 1);
    }

    #[test]
    fn canonical_conversion_clamps_fractional_and_wild_scores() {
        let value = json!({
            "criteria": [
                { "name": "Clarity", "score": 6.4, "explanation": "Mostly clear." },
                { "name": "Grammar", "score": 42, "explanation": "" },
                { "name": "Tone", "score": -3, "explanation": "" },
            ],
            "corrected_essay": "A short essay!",
            "summary": "Fine.",
            "explanations": "Fine.",
        });
        let result = EvaluationResult::from_canonical(&value, &request()).unwrap();
        let scores: Vec<_> = result.criteria.iter().map(|c| c.score).collect();
        assert_eq!(scores, [6, 10, 1]);
        assert_eq!(result.source, EvaluationSource::ExternalService);
    }

    #[test]
    fn canonical_conversion_rejects_an_empty_criteria_list() {
        let value = json!({
            "criteria": [],
            "corrected_essay": "x",
            "summary": "",
            "explanations": "",
        });
        assert!(matches!(
            EvaluationResult::from_canonical(&value, &request()),
            Err(EvalError::MalformedResponse)
        ));
    }

    #[test]
    fn rejects_object_with_no_recognizable_scores() {
        let value = json!({ "message": "I cannot evaluate this." });
        assert!(matches!(
            EvaluationResult::from_extracted(&value, &request()),
            Err(EvalError::MalformedResponse)
        ));
    }

    #[test]
    fn clamps_scores_into_range() {
        assert_eq!(clamp_score(0.0, 10), 1);
        assert_eq!(clamp_score(-3.0, 10), 1);
        assert_eq!(clamp_score(11.0, 10), 10);
        assert_eq!(clamp_score(7.5, 10), 8);
        assert_eq!(clamp_score(f64::NAN, 10), 1);
        assert_eq!(clamp_score(f64::INFINITY, 5), 1);
    }

    #[test]
    fn source_tags_serialize_as_kebab_case() {
        let ext = serde_json::to_value(EvaluationSource::ExternalService).unwrap();
        let fall = serde_json::to_value(EvaluationSource::FallbackHeuristic).unwrap();
        assert_eq!(ext, json!("external-service"));
        assert_eq!(fall, json!("fallback-heuristic"));
    }
}
