//! Error taxonomy for the evaluation pipeline.
//!
//! Only [`EvalError::EmptyInput`] and [`EvalError::InvalidScale`] are ever
//! surfaced to the user. Service and parsing failures are absorbed by the
//! orchestrator, which falls back to the heuristic evaluator, and export
//! failures are downgraded to warnings after the result has been computed.

use thiserror::Error;

/// Everything that can go wrong while evaluating an essay.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The essay text was empty or blank. Rejected before any service call.
    #[error("essay text is empty; provide text, a file, an image, or a PDF")]
    EmptyInput,

    /// The requested score scale is unusable. This is a caller bug.
    #[error("scale_max must be at least 1, got {0}")]
    InvalidScale(u32),

    /// The external service could not be reached or refused the request.
    /// Recovered internally via the fallback evaluator.
    #[error("evaluation service unavailable: {0}")]
    ServiceUnavailable(#[source] anyhow::Error),

    /// The external service replied, but no usable structure could be
    /// recovered from its response. Recovered internally via the fallback
    /// evaluator.
    #[error("could not recover a structured evaluation from the service response")]
    MalformedResponse,

    /// A report writer failed. The evaluation result itself is still valid.
    #[error("could not write report to {path}")]
    Export {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
