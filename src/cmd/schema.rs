//! The `schema` subcommand.

use clap::{Args, ValueEnum};
use schemars::schema_for;

use crate::{evaluation::EvaluationResult, prelude::*, prompt};

/// The different schema types we support.
///
/// We parse these as PascalCase, because they represent type names.
#[derive(Debug, Clone, Copy, ValueEnum)]
#[clap(rename_all = "PascalCase")]
pub enum SchemaType {
    /// The normalized evaluation result consumed by reports.
    EvaluationResult,
    /// The canonical response shape requested from the model.
    ModelResponse,
}

/// Schema command line arguments.
#[derive(Debug, Args)]
pub struct SchemaOpts {
    /// The schema type to generate.
    #[clap(value_enum, value_name = "TYPE")]
    pub schema_type: SchemaType,

    /// The output path to write the schema to.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,
}

/// Run the `schema` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_schema(opts: &SchemaOpts) -> Result<()> {
    let schema = match opts.schema_type {
        SchemaType::EvaluationResult => serde_json::to_value(schema_for!(
            EvaluationResult
        ))
        .context("cannot serialize schema")?,
        SchemaType::ModelResponse => prompt::response_schema(),
    };
    let mut rendered =
        serde_json::to_string_pretty(&schema).context("cannot render schema")?;
    rendered.push('\n');

    match &opts.output_path {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?,
        None => print!("{rendered}"),
    }
    Ok(())
}
