//! Custom error types for xcollect.
//!
//! Two layers: [`ProviderError`] classifies a single failed provider call so
//! callers can tell skip-and-continue apart from abort, and [`CollectError`]
//! is what a run as a whole fails with.

use std::path::PathBuf;
use thiserror::Error;

/// What a caller should do with a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Try again after backing off.
    Retry,
    /// Give up on this call; retrying cannot help.
    Fatal,
}

/// Failure of one provider request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// HTTP 429.
    #[error("Rate limit exceeded (HTTP 429)")]
    RateLimited,

    /// Provider rejected the request shape (HTTP 400), e.g. a malformed batch.
    #[error("Provider rejected the request (HTTP 400): {body}")]
    BadRequest { body: String },

    /// Server-side or transport failure that may clear up.
    #[error("Transient provider failure: {reason}")]
    Transient { reason: String },

    /// Credentials missing, invalid, or not entitled (HTTP 401/403).
    #[error("Provider refused credentials (HTTP {status})")]
    Unauthorized { status: u16 },

    /// Any other non-success status.
    #[error("Provider returned HTTP {status}: {body}")]
    Terminal { status: u16, body: String },
}

impl ProviderError {
    /// Classify an HTTP status code with its (truncated) body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let body: String = body.chars().take(500).collect();
        match status {
            429 => Self::RateLimited,
            400 => Self::BadRequest { body },
            401 | 403 => Self::Unauthorized { status },
            500..=599 => Self::Transient {
                reason: format!("HTTP {status}: {body}"),
            },
            _ => Self::Terminal { status, body },
        }
    }

    /// Retry or give up.
    #[must_use]
    pub const fn disposition(&self) -> Disposition {
        match self {
            Self::RateLimited | Self::BadRequest { .. } | Self::Transient { .. } => {
                Disposition::Retry
            }
            Self::Unauthorized { .. } | Self::Terminal { .. } => Disposition::Fatal,
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.disposition(), Disposition::Retry)
    }
}

/// Primary error type for xcollect runs.
#[derive(Error, Debug)]
pub enum CollectError {
    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// Pagination hit a fatal provider error, or ran out of retries.
    #[error("Pagination aborted on page {page} after {attempts} attempt(s): {source}")]
    PaginationAborted {
        page: u32,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// The handle could not be resolved to a user id.
    #[error("Could not find user id for @{username}")]
    UserNotFound { username: String },

    /// A provider call outside pagination failed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // =========================================================================
    // Raw File Errors
    // =========================================================================
    /// Raw page file does not exist.
    #[error("Raw page file not found at '{path}'")]
    RawFileNotFound { path: PathBuf },

    /// Raw page file exists but cannot be used.
    #[error("Invalid raw page file '{path}': {reason}")]
    InvalidRawFile { path: PathBuf, reason: String },

    // =========================================================================
    // IO Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// Required setting absent.
    #[error("Missing configuration: {setting}")]
    MissingConfig { setting: &'static str },

    /// Invalid command-line argument.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Another error with a note on what was being attempted.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type alias for xcollect operations.
pub type Result<T> = std::result::Result<T, CollectError>;

impl CollectError {
    pub fn raw_file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::RawFileNotFound { path: path.into() }
    }

    pub fn invalid_raw_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidRawFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// IO failure on a specific path; `operation` reads as "Failed to {operation}".
    pub fn path_error(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// The user can fix this by changing input or configuration.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RawFileNotFound { .. }
                | Self::InvalidArgument { .. }
                | Self::MissingConfig { .. }
                | Self::UserNotFound { .. }
        )
    }

    /// Pages written before this error can be resumed from.
    #[must_use]
    pub const fn is_resumable(&self) -> bool {
        matches!(self, Self::PaginationAborted { .. })
    }

    /// One-line hint shown under the error in the CLI.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::PaginationAborted {
                source: ProviderError::Unauthorized { .. },
                ..
            }
            | Self::Provider(ProviderError::Unauthorized { .. }) => {
                Some("Check XCOLLECT_API_KEY (or RAPID_API_KEY) and the provider subscription.")
            }
            Self::PaginationAborted { .. } => Some(
                "Pages fetched so far were saved; run 'xcollect backfill <raw_file>' to finish from them.",
            ),
            Self::MissingConfig { .. } => {
                Some("Set XCOLLECT_API_KEY or add api_key under [provider] in config.toml.")
            }
            Self::RawFileNotFound { .. } => {
                Some("Pass the path of a raw file written by 'xcollect collect' or 'xcollect pages'.")
            }
            _ => None,
        }
    }
}

/// Attach what was being attempted to a foreign error.
pub trait ResultExt<T> {
    /// # Errors
    ///
    /// Wraps the error as [`CollectError::WithContext`].
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`], building the message only on failure.
    ///
    /// # Errors
    ///
    /// Wraps the error as [`CollectError::WithContext`].
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CollectError::with_context(context, e))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| CollectError::with_context(f(), e))
    }
}

// =============================================================================
// CLI rendering
// =============================================================================

use colored::Colorize;

/// Render an error for stderr: a title line, an optional explanation, then
/// one hint or a bulleted list of them.
#[must_use]
pub fn format_error(title: &str, explanation: &str, suggestions: &[&str]) -> String {
    let mut lines = vec![format!("{} {}", "✗".red().bold(), title.bold())];
    if !explanation.is_empty() {
        lines.push(String::new());
        lines.push(format!("   {explanation}"));
    }
    match suggestions {
        [] => {}
        [only] => {
            lines.push(String::new());
            lines.push(format!("   {} {only}", "Hint:".cyan()));
        }
        many => {
            lines.push(String::new());
            lines.push(format!("   {}:", "Try".cyan()));
            lines.extend(many.iter().map(|s| format!("     {} {s}", "•".dimmed())));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(ProviderError::from_status(429, ""), ProviderError::RateLimited);
        assert!(matches!(
            ProviderError::from_status(400, "bad ids"),
            ProviderError::BadRequest { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(403, ""),
            ProviderError::Unauthorized { status: 403 }
        ));
        assert!(matches!(
            ProviderError::from_status(503, ""),
            ProviderError::Transient { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(404, ""),
            ProviderError::Terminal { status: 404, .. }
        ));
    }

    #[test]
    fn disposition_splits_retry_from_fatal() {
        assert!(ProviderError::RateLimited.is_retryable());
        assert!(ProviderError::from_status(400, "").is_retryable());
        assert!(ProviderError::from_status(502, "").is_retryable());
        assert_eq!(
            ProviderError::Unauthorized { status: 401 }.disposition(),
            Disposition::Fatal
        );
        assert!(!ProviderError::from_status(404, "").is_retryable());
    }

    #[test]
    fn body_is_truncated() {
        let body = "x".repeat(2000);
        match ProviderError::from_status(418, &body) {
            ProviderError::Terminal { body, .. } => assert_eq!(body.len(), 500),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pagination_abort_is_resumable_with_hint() {
        let err = CollectError::PaginationAborted {
            page: 3,
            attempts: 3,
            source: ProviderError::RateLimited,
        };
        assert!(err.is_resumable());
        assert!(err.to_string().contains("page 3"));
        assert!(err.suggestion().unwrap().contains("backfill"));

        let auth = CollectError::PaginationAborted {
            page: 1,
            attempts: 1,
            source: ProviderError::Unauthorized { status: 401 },
        };
        assert!(auth.suggestion().unwrap().contains("API_KEY"));
    }

    #[test]
    fn context_wraps_foreign_errors() {
        let parsed: std::result::Result<u32, _> = "x".parse::<u32>();
        let err = parsed.context("reading page count").unwrap_err();
        assert!(matches!(err, CollectError::WithContext { .. }));
        assert!(err.to_string().starts_with("reading page count: "));
    }

    #[test]
    fn format_error_single_hint() {
        let output = format_error("Raw page file not found", "", &["Pass a path"]);
        assert!(output.contains("Hint:"));
        assert!(!output.contains("Try"));
    }

    #[test]
    fn format_error_multiple_suggestions() {
        let output = format_error("Test Error", "Something went wrong", &["First", "Second"]);
        assert!(output.contains("Test Error"));
        assert!(output.contains("First"));
        assert!(output.contains("Second"));
    }
}
