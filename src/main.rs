use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::prelude::*;

mod acquire;
mod cmd;
mod error;
mod evaluation;
mod extract;
mod heuristic;
mod llm_client;
mod orchestrator;
mod prelude;
mod prompt;
mod report;
mod retry;
mod service;

/// Score and correct essays with an LLM, with a deterministic offline
/// fallback.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - OPENAI_API_BASE (optional): Override the server URL.
  - OPENAI_API_KEY: The OpenAI key to use. When unset, evaluation
    falls back to the offline heuristic evaluator.

  These variables may be set in a standard `.env` file.

External Tools:
  Image input needs `tesseract` on PATH; PDF input needs `pdftotext`
  and `pdftoppm` from poppler-utils.
"#
)]
struct Opts {
    #[clap(subcommand)]
    subcmd: Cmd,
}

/// The subcommands we support.
#[derive(Debug, Subcommand)]
enum Cmd {
    /// Evaluate one essay from text, a file, an image, or a PDF.
    Evaluate(cmd::evaluate::EvaluateOpts),
    /// Print schemas for the result contract and the model response.
    Schema(cmd::schema::SchemaOpts),
}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    // We can stack multiple layers here if we need to.
    tracing_subscriber::registry().with(subscriber).init();

    // Call our real `main` function now that logging is set up.
    real_main().await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main() -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    // Parse command-line arguments.
    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    // Run the appropriate subcommand.
    match &opts.subcmd {
        Cmd::Evaluate(opts) => cmd::evaluate::cmd_evaluate(opts).await?,
        Cmd::Schema(opts) => cmd::schema::cmd_schema(opts).await?,
    }
    Ok(())
}
