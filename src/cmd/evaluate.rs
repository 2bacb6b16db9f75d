//! The `evaluate` subcommand.

use clap::Args;

use crate::{
    acquire::EssaySource,
    evaluation::EvaluationRequest,
    llm_client::has_llm_credentials,
    orchestrator,
    prelude::*,
    report::{self, ReportFormat},
    service::{ChatService, LlmOpts, OpenAiService},
};

/// Evaluate command line arguments.
#[derive(Args, Debug)]
pub struct EvaluateOpts {
    /// The essay text itself. When neither this nor `--file` is given, the
    /// essay is read from standard input.
    #[clap(long)]
    pub text: Option<String>,

    /// A file containing the essay: plain text, an image of a written page,
    /// or a PDF. The kind is detected from the file content.
    #[clap(long)]
    pub file: Option<PathBuf>,

    /// The upper bound of each criterion score.
    #[clap(long, default_value_t = EvaluationRequest::DEFAULT_SCALE_MAX)]
    pub scale_max: u32,

    /// The model to use for evaluation.
    #[clap(long, default_value = "gpt-4o-mini")]
    pub model: String,

    /// Skip the external service and use the deterministic fallback
    /// evaluator, even when credentials are available.
    #[clap(long)]
    pub offline: bool,

    #[clap(flatten)]
    pub llm_opts: LlmOpts,

    /// The report format.
    #[clap(long, value_enum, default_value_t)]
    pub format: ReportFormat,

    /// Write the report here instead of to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// Run the `evaluate` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_evaluate(opts: &EvaluateOpts) -> Result<()> {
    // Acquire our essay text.
    let source = EssaySource::detect(opts.text.clone(), opts.file.clone())?;
    let essay_text = source.acquire().await?;
    let request = EvaluationRequest::new(essay_text, opts.scale_max)?;

    // Decide whether we can use the external service.
    let service = if opts.offline {
        None
    } else if has_llm_credentials() {
        Some(OpenAiService::new(opts.model.clone())?)
    } else {
        info!("no service credentials found; using the fallback evaluator");
        None
    };
    let service = service.as_ref().map(|s| s as &dyn ChatService);

    // Evaluate and render. This always produces a result.
    let result = orchestrator::evaluate(service, &request, &opts.llm_opts).await;
    let report = report::render(&result, request.scale_max(), opts.format)?;

    // Write out our report. A failed export is a warning, not a failure: the
    // evaluation is already computed, so we still show it.
    match &opts.output_path {
        Some(path) => {
            if let Err(err) = report::write_to_file(path, &report).await {
                warn!("{err}; printing the report instead");
                print!("{report}");
            }
        }
        None => print!("{report}"),
    }
    Ok(())
}
