//! Report rendering and export.
//!
//! Report writers consume an [`EvaluationResult`] read-only. A failed export
//! never invalidates the result: the caller downgrades it to a warning and
//! still shows the evaluation.

use clap::ValueEnum;

use crate::{error::EvalError, evaluation::EvaluationResult, prelude::*};

/// The report formats we support.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Plain text, for terminals.
    #[default]
    Text,

    /// Markdown, for pasting into documents.
    Markdown,

    /// The full structured result as pretty-printed JSON.
    Json,
}

/// Render a result in the requested format.
pub fn render(
    result: &EvaluationResult,
    scale_max: u32,
    format: ReportFormat,
) -> Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(result, scale_max)),
        ReportFormat::Markdown => Ok(render_markdown(result, scale_max)),
        ReportFormat::Json => {
            let mut json = serde_json::to_string_pretty(result)
                .context("cannot serialize evaluation result")?;
            json.push('\n');
            Ok(json)
        }
    }
}

fn render_text(result: &EvaluationResult, scale_max: u32) -> String {
    let mut out = String::new();
    out.push_str("=== Evaluation Scores ===\n");
    for criterion in &result.criteria {
        out.push_str(&format!(
            "{}: {}/{}\n",
            criterion.name, criterion.score, scale_max
        ));
        if !criterion.explanation.is_empty() {
            out.push_str(&format!("  {}\n", criterion.explanation));
        }
    }
    out.push_str("\n=== Corrected Essay ===\n");
    out.push_str(&result.corrected_essay);
    if !result.summary.is_empty() {
        out.push_str("\n\n=== Summary ===\n");
        out.push_str(&result.summary);
    }
    if !result.explanations.is_empty() {
        out.push_str("\n\n=== Teaching Notes ===\n");
        out.push_str(&result.explanations);
    }
    out.push_str(&format!("\n\n[source: {}]\n", source_tag(result)));
    out
}

fn render_markdown(result: &EvaluationResult, scale_max: u32) -> String {
    let mut out = String::new();
    out.push_str("# Essay Evaluation Report\n\n");
    out.push_str("## Scores\n\n");
    out.push_str("| Criterion | Score | Explanation |\n");
    out.push_str("| --- | --- | --- |\n");
    for criterion in &result.criteria {
        out.push_str(&format!(
            "| {} | {}/{} | {} |\n",
            criterion.name, criterion.score, scale_max, criterion.explanation
        ));
    }
    out.push_str("\n## Corrected Essay\n\n");
    out.push_str(&result.corrected_essay);
    if !result.summary.is_empty() {
        out.push_str("\n\n## Summary\n\n");
        out.push_str(&result.summary);
    }
    if !result.explanations.is_empty() {
        out.push_str("\n\n## Teaching Notes\n\n");
        out.push_str(&result.explanations);
    }
    out.push_str(&format!("\n\n*Source: {}*\n", source_tag(result)));
    out
}

fn source_tag(result: &EvaluationResult) -> &'static str {
    use crate::evaluation::EvaluationSource;
    match result.source {
        EvaluationSource::ExternalService => "external-service",
        EvaluationSource::FallbackHeuristic => "fallback-heuristic",
    }
}

/// Write a rendered report to a file.
pub async fn write_to_file(path: &Path, report: &str) -> Result<(), EvalError> {
    tokio::fs::write(path, report)
        .await
        .map_err(|source| EvalError::Export {
            path: path.display().to_string(),
            source,
        })
}
