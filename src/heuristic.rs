//! The deterministic fallback evaluator.
//!
//! Used whenever the external service is disabled, unreachable, or returns
//! nothing usable, so the pipeline never dead-ends. The scores are transparent
//! heuristics over surface features of the text, not a grammar model, and no
//! correction is attempted: the corrected essay is the input, unchanged.
//!
//! Determinism is a hard requirement here. Identical input and scale must
//! produce bit-identical results, so this is a pure function with no sampling
//! and no clocks.

use crate::evaluation::{
    Criterion, EvaluationResult, EvaluationSource, clamp_score,
};

/// Evaluate an essay without the external service.
///
/// Every score is clamped to `[1, scale_max]`, including for degenerate
/// inputs such as empty or single-word text.
pub fn heuristic_evaluate(essay: &str, scale_max: u32) -> EvaluationResult {
    let scale = f64::from(scale_max);

    let words: Vec<&str> = essay.split_whitespace().collect();
    let word_count = words.len().max(1);
    let sentence_count = essay
        .chars()
        .filter(|c| matches!(c, '.' | '!' | '?'))
        .count()
        .max(1);
    let avg_word_len = words.iter().map(|w| w.chars().count()).sum::<usize>() as f64
        / word_count as f64;
    let long_word_ratio =
        words.iter().filter(|w| w.chars().count() > 7).count() as f64 / word_count as f64;
    let doubled_spaces = essay.matches("  ").count() as f64;

    // All scores go through `clamp_score`, which rounds half-steps to the
    // nearest integer rather than truncating them.
    // Clarity peaks when the average word length sits near five characters.
    let clarity = clamp_score(scale * (1.0 - ((avg_word_len - 5.0) / 5.0).abs()), scale_max);
    // Doubled spaces are the one mechanical slip we can spot without a model.
    let grammar = clamp_score(
        scale * (0.6 + 0.4 * (100.0 / (1.0 + doubled_spaces)).min(1.0)),
        scale_max,
    );
    let organization = clamp_score((sentence_count as f64 / 2.0).min(scale), scale_max);
    let evidence = clamp_score(scale * (long_word_ratio * 2.0).min(1.0), scale_max);
    let vocabulary = clamp_score(scale * (long_word_ratio * 1.2).min(1.0), scale_max);
    let coherence = clamp_score(f64::from(clarity + organization) / 2.0, scale_max);

    let criterion = |name: &str, score: u32, explanation: &str| Criterion {
        name: name.to_owned(),
        score,
        explanation: explanation.to_owned(),
    };
    let criteria = vec![
        criterion(
            "Clarity of Ideas",
            clarity,
            "Based on sentence complexity and average word length.",
        ),
        criterion(
            "Organization & Flow",
            organization,
            "Estimated from sentence count and structure.",
        ),
        criterion(
            "Grammar & Mechanics",
            grammar,
            "Surface-level check only; low confidence without a grammar model.",
        ),
        criterion(
            "Evidence & Support",
            evidence,
            "Estimated from the share of longer words, as a proxy.",
        ),
        criterion(
            "Vocabulary & Style",
            vocabulary,
            "Estimated from word length and variety.",
        ),
        criterion(
            "Coherence",
            coherence,
            "Average of the clarity and organization heuristics.",
        ),
    ];

    EvaluationResult {
        criteria,
        corrected_essay: essay.to_owned(),
        summary: "Deterministic fallback evaluation (external service not used). \
                  Scores are heuristic estimates."
            .to_owned(),
        explanations: "Sentence-by-sentence explanations are not available without \
                       the external service."
            .to_owned(),
        source: EvaluationSource::FallbackHeuristic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESSAY: &str = "The committee deliberated extensively. Nevertheless, the \
                         proposal advanced. Everyone agreed it was remarkable!";

    #[test]
    fn identical_input_yields_identical_results() {
        let a = heuristic_evaluate(ESSAY, 10);
        let b = heuristic_evaluate(ESSAY, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn corrected_essay_is_the_unmodified_input() {
        let result = heuristic_evaluate(ESSAY, 10);
        assert_eq!(result.corrected_essay, ESSAY);
        assert_eq!(result.source, EvaluationSource::FallbackHeuristic);
    }

    #[test]
    fn scores_stay_in_range_for_ordinary_text() {
        let result = heuristic_evaluate(ESSAY, 10);
        assert_eq!(result.criteria.len(), 6);
        for criterion in &result.criteria {
            assert!(
                (1..=10).contains(&criterion.score),
                "{} scored {}",
                criterion.name,
                criterion.score
            );
        }
    }

    #[test]
    fn scores_stay_in_range_for_degenerate_inputs() {
        for text in ["", "word", "a", "...", "    ", "supercalifragilistic"] {
            for scale_max in [1, 2, 10, 100] {
                let result = heuristic_evaluate(text, scale_max);
                for criterion in &result.criteria {
                    assert!(
                        (1..=scale_max).contains(&criterion.score),
                        "{:?} with scale {} gave {} = {}",
                        text,
                        scale_max,
                        criterion.name,
                        criterion.score
                    );
                }
            }
        }
    }

    #[test]
    fn fractional_scores_round_to_the_nearest_step() {
        // Three sentence enders give a raw organization score of 1.5, which
        // rounds up to 2. Truncation would give 1.
        let result = heuristic_evaluate(ESSAY, 10);
        let organization = result
            .criteria
            .iter()
            .find(|c| c.name == "Organization & Flow")
            .unwrap();
        assert_eq!(organization.score, 2);
    }

    #[test]
    fn scale_of_one_pins_every_score_to_one() {
        let result = heuristic_evaluate(ESSAY, 1);
        assert!(result.criteria.iter().all(|c| c.score == 1));
    }
}
