//! Sequencing one evaluation from request to guaranteed result.
//!
//! The orchestrator never returns nothing: every ordinary failure mode
//! (missing credentials, network errors, timeouts, unusable model output) is
//! absorbed by falling back to the deterministic heuristic evaluator. Input
//! validation happens earlier, at [`EvaluationRequest`] construction, so by
//! the time a request reaches this module it is known to be well-formed.

use std::sync::LazyLock;

use crate::{
    error::EvalError,
    evaluation::{EvaluationRequest, EvaluationResult},
    extract::extract_json,
    heuristic::heuristic_evaluate,
    prelude::*,
    prompt,
    service::{ChatService, LlmOpts},
};

/// Validator for the canonical response schema, built once. The schema is a
/// built-in constant, so construction cannot fail at runtime.
static RESPONSE_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    jsonschema::validator_for(&prompt::response_schema())
        .expect("built-in response schema should be valid")
});

/// Evaluate an essay, preferring the external service when one is supplied.
///
/// Passing `None` for `service` (no credentials, or offline mode) skips
/// straight to the fallback evaluator.
#[instrument(level = "debug", skip_all)]
pub async fn evaluate(
    service: Option<&dyn ChatService>,
    request: &EvaluationRequest,
    llm_opts: &LlmOpts,
) -> EvaluationResult {
    let Some(service) = service else {
        info!("external service disabled; using the fallback evaluator");
        return heuristic_evaluate(request.essay_text(), request.scale_max());
    };

    match evaluate_external(service, request, llm_opts).await {
        Ok(result) => result,
        Err(err) => {
            warn!("falling back to the heuristic evaluator: {err}");
            heuristic_evaluate(request.essay_text(), request.scale_max())
        }
    }
}

/// One attempt at the external path: call, extract, coerce.
async fn evaluate_external(
    service: &dyn ChatService,
    request: &EvaluationRequest,
    llm_opts: &LlmOpts,
) -> Result<EvaluationResult, EvalError> {
    let raw = service.request_evaluation(request, llm_opts).await?;
    let value = extract_json(&raw).ok_or(EvalError::MalformedResponse)?;

    // Endpoints that honor `response_format` match the canonical schema and
    // take the strict typed path. Anything else goes through the lenient
    // coercer, which salvages what it can or reports the response as
    // malformed.
    if RESPONSE_VALIDATOR.is_valid(&value) {
        return EvaluationResult::from_canonical(&value, request);
    }
    debug!("response does not match the canonical schema; coercing leniently");
    EvaluationResult::from_extracted(&value, request)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::evaluation::EvaluationSource;

    /// A service that always replies with the same content.
    #[derive(Debug)]
    struct CannedService(&'static str);

    #[async_trait]
    impl ChatService for CannedService {
        async fn request_evaluation(
            &self,
            _request: &EvaluationRequest,
            _llm_opts: &LlmOpts,
        ) -> Result<String, EvalError> {
            Ok(self.0.to_owned())
        }
    }

    /// A service that always fails, as a timed-out call would.
    #[derive(Debug)]
    struct UnreachableService;

    #[async_trait]
    impl ChatService for UnreachableService {
        async fn request_evaluation(
            &self,
            _request: &EvaluationRequest,
            _llm_opts: &LlmOpts,
        ) -> Result<String, EvalError> {
            Err(EvalError::ServiceUnavailable(anyhow!(
                "service request timed out"
            )))
        }
    }

    fn request() -> EvaluationRequest {
        EvaluationRequest::new("An essay about resilience and time.", 10).unwrap()
    }

    #[tokio::test]
    async fn no_service_uses_the_fallback() {
        let request = request();
        let result = evaluate(None, &request, &LlmOpts::default()).await;
        assert_eq!(result.source, EvaluationSource::FallbackHeuristic);
        assert_eq!(result.corrected_essay, request.essay_text());
    }

    #[tokio::test]
    async fn service_failure_falls_back_without_raising() {
        let request = request();
        let result =
            evaluate(Some(&UnreachableService), &request, &LlmOpts::default()).await;
        assert_eq!(result.source, EvaluationSource::FallbackHeuristic);
        assert_eq!(result.corrected_essay, request.essay_text());
    }

    #[tokio::test]
    async fn clean_canonical_reply_is_tagged_external() {
        let service = CannedService(
            r#"{
                "criteria": [
                    { "name": "Clarity", "score": 8, "explanation": "Clear." }
                ],
                "corrected_essay": "An essay about resilience, and time.",
                "summary": "Good.",
                "explanations": "Fine."
            }"#,
        );
        let result = evaluate(Some(&service), &request(), &LlmOpts::default()).await;
        assert_eq!(result.source, EvaluationSource::ExternalService);
        assert_eq!(result.criteria[0].name, "Clarity");
        assert_eq!(result.corrected_essay, "An essay about resilience, and time.");
    }

    #[tokio::test]
    async fn noisy_reply_with_embedded_object_is_tagged_external() {
        let service = CannedService(
            "Sure! Here's the result: {\"grammar\":8,\"vocabulary\":7} Hope that helps!",
        );
        let result = evaluate(Some(&service), &request(), &LlmOpts::default()).await;
        assert_eq!(result.source, EvaluationSource::ExternalService);
        let names: Vec<_> = result.criteria.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Grammar", "Vocabulary"]);
    }

    #[tokio::test]
    async fn brace_free_refusal_falls_back() {
        let service = CannedService("I cannot process this request.");
        let result = evaluate(Some(&service), &request(), &LlmOpts::default()).await;
        assert_eq!(result.source, EvaluationSource::FallbackHeuristic);
    }

    #[tokio::test]
    async fn fallback_results_are_deterministic() {
        let request = request();
        let a = evaluate(None, &request, &LlmOpts::default()).await;
        let b = evaluate(None, &request, &LlmOpts::default()).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn schema_valid_reply_takes_the_strict_path_and_still_clamps() {
        let service = CannedService(
            r#"{"criteria": [
                { "name": "Clarity", "score": 42, "explanation": "" },
                { "name": "Grammar", "score": -3, "explanation": "" }
            ], "corrected_essay": "x", "summary": "", "explanations": ""}"#,
        );
        let result = evaluate(Some(&service), &request(), &LlmOpts::default()).await;
        assert_eq!(result.source, EvaluationSource::ExternalService);
        let scores: Vec<_> = result.criteria.iter().map(|c| c.score).collect();
        assert_eq!(scores, [10, 1]);
    }
}
