//! The evaluation prompt and the schema the model must follow.

use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs,
};
use handlebars::Handlebars;

use crate::{evaluation::EvaluationRequest, prelude::*};

/// The developer (aka "system") message.
const SYSTEM_TEMPLATE: &str = "\
You are an expert writing evaluator. You always reply with a single JSON \
object and no surrounding commentary.";

/// The user message. `essay_text` uses triple braces so handlebars passes the
/// essay through without HTML-escaping quotes and ampersands.
const USER_TEMPLATE: &str = r#"Evaluate the essay below.

1) Identify 5-8 evaluation criteria that are most relevant to this essay
   (e.g. Clarity, Argument Strength, Grammar, Evidence, Organization, Tone).
2) For each criterion, give a numeric score from 1 to {{scale_max}} and a
   short (1-2 sentence) explanation.
3) Provide a corrected version of the essay, fixing grammar and typos while
   preserving the author's meaning.
4) Provide a short summary analysis (2-4 sentences).
5) Provide sentence-by-sentence explanations suitable for teaching.

Output ONLY a JSON object with keys:
- criteria: list of objects { "name": ..., "score": ..., "explanation": ... }
- corrected_essay: string
- summary: string
- explanations: string

Essay:
"""
{{{essay_text}}}
"""
"#;

/// Template bindings for one request.
fn bindings(request: &EvaluationRequest) -> Value {
    json!({
        "essay_text": request.essay_text(),
        "scale_max": request.scale_max(),
    })
}

/// Render the user message for a request.
pub(crate) fn render_user_message(request: &EvaluationRequest) -> Result<String> {
    let handlebars = Handlebars::new();
    handlebars
        .render_template(USER_TEMPLATE, &bindings(request))
        .context("Error rendering evaluation prompt")
}

/// Build the chat messages for a request.
pub fn evaluation_messages(
    request: &EvaluationRequest,
) -> Result<Vec<ChatCompletionRequestMessage>> {
    let system = ChatCompletionRequestSystemMessageArgs::default()
        .content(SYSTEM_TEMPLATE)
        .build()
        .context("Error building system message")?;
    let user = ChatCompletionRequestUserMessageArgs::default()
        .content(render_user_message(request)?)
        .build()
        .context("Error building user message")?;
    Ok(vec![system.into(), user.into()])
}

/// The JSON Schema for the model's response, in the canonical criteria-list
/// shape. Passed to `response_format` (strict mode requires every property to
/// be listed in `required` and `additionalProperties: false`) and reused to
/// validate responses before coercion.
pub fn response_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "EssayEvaluation",
        "description": "A structured evaluation of one essay.",
        "type": "object",
        "properties": {
            "criteria": {
                "description": "Scored evaluation criteria, in presentation order.",
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {
                            "description": "A short label for this criterion.",
                            "type": "string"
                        },
                        "score": {
                            "description": "A numeric score, at least 1.",
                            "type": "number"
                        },
                        "explanation": {
                            "description": "A 1-2 sentence justification.",
                            "type": "string"
                        }
                    },
                    "additionalProperties": false,
                    "required": ["name", "score", "explanation"]
                }
            },
            "corrected_essay": {
                "description": "The essay with grammar and typos corrected.",
                "type": "string"
            },
            "summary": {
                "description": "A short overall analysis.",
                "type": "string"
            },
            "explanations": {
                "description": "Sentence-by-sentence teaching commentary.",
                "type": "string"
            }
        },
        "additionalProperties": false,
        "required": ["criteria", "corrected_essay", "summary", "explanations"]
    })
}
