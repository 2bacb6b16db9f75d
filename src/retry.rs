//! Support utilities for [`keen_retry`]'s retry API.

use async_openai::error::OpenAIError;
use keen_retry::RetryResult;
use reqwest::StatusCode;

/// Macro which implements `?`-like behavior for [`RetryResult`].
macro_rules! try_with_retry_result {
    ($result:expr) => {
        match $result {
            ::keen_retry::RetryResult::Ok { output, .. } => output,
            ::keen_retry::RetryResult::Transient { input, error } => {
                return ::keen_retry::RetryResult::Transient {
                    input,
                    error: From::from(error),
                };
            }
            ::keen_retry::RetryResult::Fatal { input, error } => {
                return ::keen_retry::RetryResult::Fatal {
                    input,
                    error: From::from(error),
                };
            }
        }
    };
}

// Here's a trick to export a macro within a crate as if it were a normal
// symbol.
pub(crate) use try_with_retry_result;

/// Build a [`RetryResult::Ok`] value.
pub(crate) fn retry_result_ok<T, E>(output: T) -> RetryResult<(), (), T, E> {
    RetryResult::Ok {
        reported_input: (),
        output,
    }
}

/// Build a [`RetryResult::Fatal`] value.
pub(crate) fn retry_result_fatal<T, E>(error: E) -> RetryResult<(), (), T, E> {
    RetryResult::Fatal { input: (), error }
}

/// Convert a [`Result`] into a [`RetryResult`], classifying errors as
/// transient or fatal.
pub(crate) trait IntoRetryResult<T, E> {
    /// Classify the error with `is_transient`.
    fn into_retry_result(
        self,
        is_transient: impl FnOnce(&E) -> bool,
    ) -> RetryResult<(), (), T, anyhow::Error>;

    /// Treat any error as fatal.
    fn into_fatal(self) -> RetryResult<(), (), T, anyhow::Error>;
}

impl<T, E> IntoRetryResult<T, E> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn into_retry_result(
        self,
        is_transient: impl FnOnce(&E) -> bool,
    ) -> RetryResult<(), (), T, anyhow::Error> {
        match self {
            Ok(output) => retry_result_ok(output),
            Err(error) if is_transient(&error) => RetryResult::Transient {
                input: (),
                error: error.into(),
            },
            Err(error) => retry_result_fatal(error.into()),
        }
    }

    fn into_fatal(self) -> RetryResult<(), (), T, anyhow::Error> {
        match self {
            Ok(output) => retry_result_ok(output),
            Err(error) => retry_result_fatal(error.into()),
        }
    }
}

/// Is this error a known transient error?
///
/// By default, we assume errors are not transient, until they've been observed
/// in the wild, investigated and determined to be transient. This prevents us
/// from doing large numbers of retries with exponential backoff on errors that
/// will never resolve.
pub trait IsKnownTransient {
    /// Is this error likely to be transient?
    fn is_known_transient(&self) -> bool;
}

impl IsKnownTransient for reqwest::Error {
    fn is_known_transient(&self) -> bool {
        if let Some(status) = self.status() {
            status.is_known_transient()
        } else {
            // Assume all other kinds of HTTP errors are transient. Unfortunately,
            // there are a lot of things that can go wrong, and `reqwest` doesn't
            // expose most of them in sufficient detail to be certain which are
            // transient.
            true
        }
    }
}

impl IsKnownTransient for StatusCode {
    fn is_known_transient(&self) -> bool {
        let transient_failures = [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ];
        transient_failures.contains(self)
    }
}

impl IsKnownTransient for OpenAIError {
    fn is_known_transient(&self) -> bool {
        match self {
            OpenAIError::Reqwest(err) => err.is_known_transient(),
            // Rate limits and server-side hiccups resolve on their own. Auth
            // failures and invalid requests never do.
            OpenAIError::ApiError(err) => matches!(
                err.r#type.as_deref(),
                Some("server_error") | Some("rate_limit_exceeded") | Some("overloaded_error")
            ),
            _ => false,
        }
    }
}
