//! The external evaluation service.
//!
//! [`ChatService`] is the seam between the orchestrator and the network: the
//! production implementation talks to an OpenAI-compatible endpoint, and tests
//! substitute canned responses. It is constructed explicitly and passed in,
//! never lazily initialized behind the caller's back.

use std::{error, fmt, time::Duration};

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, FinishReason, ResponseFormat,
        ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use clap::Args;
use futures::{FutureExt as _, TryFutureExt as _, future::BoxFuture};
use keen_retry::{ExponentialJitter, ResolvedResult, RetryResult};
use tokio::time;

use crate::{
    error::EvalError,
    evaluation::EvaluationRequest,
    llm_client::create_llm_client,
    prelude::*,
    prompt,
    retry::{
        IntoRetryResult as _, retry_result_fatal, retry_result_ok,
        try_with_retry_result,
    },
};

/// The bounded wait applied to service calls when none is configured.
/// Expiry is an immediate fallback trigger, not an error.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Our LLM-related options.
#[derive(Args, Clone, Debug, Default)]
pub struct LlmOpts {
    /// An upper limit on the number of completion tokens to generate. This may
    /// help prevent runaway responses, but it may also cause incomplete
    /// results. For English, many models have around 4 bytes per token.
    #[clap(long)]
    pub max_completion_tokens: Option<u32>,

    /// The temperature to use for sampling, between 0.0 and 2.0. Higher values
    /// may make the output more random, while lower values may make it more
    /// deterministic. Defaults to the model's default.
    #[clap(long)]
    pub temperature: Option<f32>,

    /// The top-p sampling value to use, between 0.0 and 1.0. This is an
    /// alternative to temperature sampling. See your model's API docs for an
    /// explanation. Defaults to the model's default.
    #[clap(long)]
    pub top_p: Option<f32>,

    /// A timeout, in seconds, for the service to return a complete response.
    /// Defaults to 60 seconds. Expiry triggers the offline fallback evaluator.
    #[clap(long)]
    pub timeout: Option<u64>,
}

/// Interface to the external evaluation service.
#[async_trait]
pub trait ChatService: fmt::Debug + Send + Sync {
    /// Ask the service to evaluate an essay, returning the raw response
    /// content. The content is nominally JSON in the canonical shape, but
    /// callers must not assume it is well-formed.
    async fn request_evaluation(
        &self,
        request: &EvaluationRequest,
        llm_opts: &LlmOpts,
    ) -> Result<String, EvalError>;
}

/// [`ChatService`] backed by an OpenAI-compatible `/chat/completions`
/// endpoint (also LiteLLM and Ollama gateways).
#[derive(Debug)]
pub struct OpenAiService {
    /// The OpenAI client.
    client: Client<OpenAIConfig>,

    /// The model to use.
    model: String,
}

impl OpenAiService {
    /// Create a new service for the given model.
    pub fn new(model: String) -> Result<Self> {
        let client = create_llm_client()?;
        Ok(Self { client, model })
    }

    /// Build the chat completion request for one evaluation.
    fn build_request(
        &self,
        request: &EvaluationRequest,
        llm_opts: &LlmOpts,
    ) -> Result<CreateChatCompletionRequest> {
        let messages = prompt::evaluation_messages(request)?;

        let schema = prompt::response_schema();
        let json_schema = ResponseFormatJsonSchema {
            name: schema
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or("ResponseFormat")
                .to_owned(),
            schema: Some(schema),
            strict: Some(true),
            description: None,
        };

        let mut req = CreateChatCompletionRequestArgs::default();
        req.model(self.model.clone())
            .messages(messages)
            .response_format(ResponseFormat::JsonSchema { json_schema })
            // Prevent the endpoint from storing responses for later REST calls.
            .store(false);
        if let Some(max_completion_tokens) = llm_opts.max_completion_tokens {
            req.max_completion_tokens(max_completion_tokens);
        }
        if let Some(temperature) = llm_opts.temperature {
            req.temperature(temperature);
        }
        if let Some(top_p) = llm_opts.top_p {
            req.top_p(top_p);
        }
        req.build().context("Error building request")
    }

    /// One attempt at the service, classified for retry.
    async fn request_inner(
        &self,
        req: &CreateChatCompletionRequest,
        llm_opts: &LlmOpts,
    ) -> RetryResult<(), (), String, anyhow::Error> {
        // Call the endpoint, with a bounded wait. We merge the errors from the
        // `Result<Result<_, LlmError>, Elapsed>` into a single level.
        let chat = self.client.chat();
        let chat_future: BoxFuture<'_, Result<Value, LlmError>> =
            chat.create_byot(req).map_err(LlmError::OpenAI).boxed();
        let timeout = llm_opts.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let chat_future = time::timeout(Duration::from_secs(timeout), chat_future)
            .map(|result| match result {
                Ok(inner) => inner,
                Err(_) => Err(LlmError::Timeout),
            })
            .boxed();
        let chat_result: Value = try_with_retry_result!(
            chat_future
                .await
                .into_retry_result(LlmError::is_known_transient)
        );
        debug!(%chat_result, "Service response");
        let response = try_with_retry_result!(
            serde_json::from_value::<CreateChatCompletionResponse>(chat_result)
                .context("Error parsing chat completion response")
                .into_fatal()
        );

        if let Some(usage) = &response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Token usage"
            );
        }

        // Get the content from our response.
        let choice = match response.choices.first() {
            Some(choice) => choice,
            None => {
                return retry_result_fatal(anyhow!("No choices in service response"));
            }
        };
        if choice.finish_reason == Some(FinishReason::ContentFilter) {
            return retry_result_fatal(anyhow!("Content filter triggered"));
        }
        let content = choice.message.content.as_deref().unwrap_or_default();
        if content.trim().is_empty() {
            // An empty completion is worth another attempt.
            return RetryResult::Transient {
                input: (),
                error: anyhow!("Empty response content"),
            };
        }
        retry_result_ok(content.to_owned())
    }
}

#[async_trait]
impl ChatService for OpenAiService {
    #[instrument(level = "debug", skip_all, fields(model = %self.model))]
    async fn request_evaluation(
        &self,
        request: &EvaluationRequest,
        llm_opts: &LlmOpts,
    ) -> Result<String, EvalError> {
        let req = self
            .build_request(request, llm_opts)
            .map_err(EvalError::ServiceUnavailable)?;
        trace!(?req, "Request");

        // If we have a transient failure, back off exponentially.
        let jitter = ExponentialJitter::FromBackoffRange {
            backoff_range_millis: 1..=30_000,
            re_attempts: 5,
            jitter_ratio: 0.2,
        };

        let result = self
            .request_inner(&req, llm_opts)
            .await
            .retry_with_async(|_| async { self.request_inner(&req, llm_opts).await })
            .with_exponential_jitter(|| jitter)
            .await
            .inspect_recovered(|_, _, retry_errors_list| {
                warn!(
                    "succeeded after retrying {} times (failed attempts: [{}])",
                    retry_errors_list.len(),
                    keen_retry::loggable_retry_errors(retry_errors_list)
                )
            });

        match result {
            ResolvedResult::Ok { output, .. }
            | ResolvedResult::Recovered { output, .. } => Ok(output),
            ResolvedResult::Fatal { error, .. } => {
                Err(EvalError::ServiceUnavailable(error))
            }
            ResolvedResult::GivenUp { fatal_error, .. }
            | ResolvedResult::Unrecoverable { fatal_error, .. } => {
                Err(EvalError::ServiceUnavailable(fatal_error))
            }
        }
    }
}

/// An error which occurred while calling the service.
///
/// Used internally to fold timeouts into the retry classification.
#[derive(Debug)]
enum LlmError {
    /// An OpenAI error.
    OpenAI(OpenAIError),

    /// A timeout error.
    Timeout,
}

impl LlmError {
    /// Is this a known transient error?
    fn is_known_transient(&self) -> bool {
        use crate::retry::IsKnownTransient as _;
        match self {
            LlmError::OpenAI(err) => err.is_known_transient(),
            // Runaway responses and some kinds of network timeouts can be
            // retried with hope of a better result.
            LlmError::Timeout => true,
        }
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::OpenAI(err) => write!(f, "service error: {err}"),
            LlmError::Timeout => write!(f, "service request timed out"),
        }
    }
}

impl error::Error for LlmError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            LlmError::OpenAI(err) => Some(err),
            LlmError::Timeout => None,
        }
    }
}
