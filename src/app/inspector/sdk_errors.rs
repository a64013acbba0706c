//! Flattening and classification of AWS SDK errors.
//!
//! SDK errors are turned into `"<Code>: <message>"` strings so that the
//! credential classification below can match on the service error code. The
//! category helpers only add log context. The SDK's own retry policy is the
//! only retry that happens.

#![warn(clippy::all, rust_2018_idioms)]

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use std::fmt;

/// Message prefix used when no credential provider could supply credentials.
pub const NO_CREDENTIAL_PROVIDERS: &str = "NoCredentialProviders";

/// Renders an SDK error as `"<Code>: <message>"`, falling back to the full
/// display chain when the service returned no error code.
pub fn format_sdk_error<E, R>(err: &SdkError<E, R>) -> String
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    if let SdkError::ServiceError(service_err) = err {
        let inner = service_err.err();
        if let Some(code) = inner.code() {
            return match inner.message() {
                Some(message) if !message.is_empty() => format!("{}: {}", code, message),
                _ => code.to_string(),
            };
        }
    }
    DisplayErrorContext(err).to_string()
}

/// Converts an SDK result into an `anyhow::Result` whose root cause is the
/// formatted service error and whose context names the failed operation.
pub trait SdkResultExt<T> {
    fn sdk_context(self, operation: &str) -> anyhow::Result<T>;
}

impl<T, E, R> SdkResultExt<T> for Result<T, SdkError<E, R>>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    fn sdk_context(self, operation: &str) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!(format_sdk_error(&e)).context(format!("{} failed", operation)))
    }
}

/// True for credential failures that make any further call for the account
/// pointless: an expired session token, or no credentials at all.
pub fn is_unrecoverable_message(message: &str) -> bool {
    message.starts_with("ExpiredToken") || message.contains(NO_CREDENTIAL_PROVIDERS)
}

/// Applies [`is_unrecoverable_message`] to every cause in the error chain.
pub fn is_unrecoverable(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| is_unrecoverable_message(&cause.to_string()))
}

/// Broad kind of an API failure, used to enrich log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Throttled { code: String },
    Timeout,
    Network,
    ServiceUnavailable,
    Credentials { code: String },
    NonRetryable { code: String, is_permission_error: bool },
}

impl ErrorCategory {
    pub fn short_label(&self) -> &'static str {
        match self {
            ErrorCategory::Throttled { .. } => "throttled",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::ServiceUnavailable => "unavailable",
            ErrorCategory::Credentials { .. } => "credentials",
            ErrorCategory::NonRetryable {
                is_permission_error: true,
                ..
            } => "permission",
            ErrorCategory::NonRetryable { .. } => "error",
        }
    }
}

pub fn categorize_error(error: &anyhow::Error) -> ErrorCategory {
    categorize_error_string(&format!("{:#}", error))
}

pub fn categorize_error_string(error_str: &str) -> ErrorCategory {
    let code = extract_error_code(error_str);

    if error_str.contains("ExpiredToken")
        || error_str.contains(NO_CREDENTIAL_PROVIDERS)
        || error_str.contains("InvalidClientTokenId")
    {
        return ErrorCategory::Credentials {
            code: code.unwrap_or_else(|| "Credentials".to_string()),
        };
    }

    if error_str.contains("Throttling")
        || error_str.contains("TooManyRequestsException")
        || error_str.contains("LimitExceededException")
        || error_str.contains("Rate exceeded")
    {
        return ErrorCategory::Throttled {
            code: code.unwrap_or_else(|| "Throttling".to_string()),
        };
    }

    if error_str.contains("TimeoutError") || error_str.contains("timed out") {
        return ErrorCategory::Timeout;
    }

    if error_str.contains("DispatchFailure")
        || error_str.contains("dispatch failure")
        || error_str.contains("connection")
        || error_str.contains("dns error")
    {
        return ErrorCategory::Network;
    }

    if error_str.contains("ServiceUnavailable")
        || error_str.contains("InternalException")
        || error_str.contains("InternalError")
    {
        return ErrorCategory::ServiceUnavailable;
    }

    let is_permission_error = error_str.contains("AccessDenied")
        || error_str.contains("UnauthorizedOperation")
        || error_str.contains("not authorized");

    ErrorCategory::NonRetryable {
        code: code.unwrap_or_else(|| {
            if is_permission_error {
                "AccessDenied".to_string()
            } else {
                "Error".to_string()
            }
        }),
        is_permission_error,
    }
}

/// Pulls the leading `Code` out of `"Code: message"`, looking at every
/// `": "`-separated segment so that context prefixes are skipped.
fn extract_error_code(error_str: &str) -> Option<String> {
    error_str
        .split(": ")
        .map(str::trim)
        .find(|segment| {
            !segment.is_empty()
                && segment.len() < 50
                && !segment.contains(' ')
                && segment.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && segment.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_expired_token_prefix_is_unrecoverable() {
        assert!(is_unrecoverable_message(
            "ExpiredTokenException: The security token included in the request is expired"
        ));
        assert!(!is_unrecoverable_message(
            "AccessDenied: ExpiredToken appears mid-message"
        ));
    }

    #[test]
    fn test_no_credential_providers_anywhere_is_unrecoverable() {
        assert!(is_unrecoverable_message(
            "failed to load: NoCredentialProviders: no valid providers in chain"
        ));
    }

    #[test]
    fn test_other_errors_are_recoverable() {
        assert!(!is_unrecoverable_message("AccessDenied: User is not authorized to perform sts:AssumeRole"));
        assert!(!is_unrecoverable_message(""));
    }

    #[test]
    fn test_unrecoverable_checks_root_cause_under_context() {
        let err = anyhow!("ExpiredToken: token expired").context("AssumeRole failed");
        assert!(is_unrecoverable(&err));

        let err = anyhow!("AccessDenied: nope").context("AssumeRole failed");
        assert!(!is_unrecoverable(&err));
    }

    #[test]
    fn test_categorize_throttling() {
        let cat = categorize_error_string("ListFindings failed: ThrottlingException: Rate exceeded");
        assert_eq!(
            cat,
            ErrorCategory::Throttled {
                code: "ThrottlingException".to_string()
            }
        );
        assert_eq!(cat.short_label(), "throttled");
    }

    #[test]
    fn test_categorize_access_denied() {
        let cat = categorize_error_string("AccessDeniedException: User is not authorized");
        assert_eq!(cat.short_label(), "permission");
    }

    #[test]
    fn test_categorize_credentials() {
        let cat = categorize_error(&anyhow!("ExpiredToken: expired").context("ListAssessmentTargets failed"));
        assert_eq!(
            cat,
            ErrorCategory::Credentials {
                code: "ExpiredToken".to_string()
            }
        );
    }

    #[test]
    fn test_extract_error_code_skips_context_prefix() {
        assert_eq!(
            extract_error_code("DescribeFindings failed: InvalidInputException: bad arn"),
            Some("InvalidInputException".to_string())
        );
        assert_eq!(extract_error_code("lowercase only"), None);
    }
}
