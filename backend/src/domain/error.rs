//! Domain-level error payload.
//!
//! Pipeline failures are typed close to where they occur
//! ([`SqlViewExecutionError`](super::SqlViewExecutionError),
//! [`InvalidUid`](super::InvalidUid)). Callers that only need to show the
//! failure, such as a debug panel or the batch runner, convert them into this
//! transport-agnostic [`Error`], which keeps a stable code, a message, and the
//! structured details needed to diagnose upstream inconsistencies.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::uid::InvalidUid;
use super::sql_view_executor::SqlViewExecutionError;

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request is malformed or fails validation.
    InvalidRequest,
    /// The upstream server rejected or failed the request.
    UpstreamFailure,
    /// The upstream server answered with a payload we cannot interpret.
    UnrecognizedResponse,
    /// The caller abandoned the operation.
    Cancelled,
    /// An unexpected error occurred inside the domain.
    InternalError,
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` must be non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use sqlview_backend::domain::{Error, ErrorCode};
///
/// let err = Error::new(ErrorCode::InvalidRequest, "missing");
/// assert_eq!(err.code(), ErrorCode::InvalidRequest);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
#[serde(try_from = "ErrorDto", into = "ErrorDto")]
pub struct Error {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Validation errors emitted by the constructors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorValidationError {
    /// The message was blank.
    #[error("error message must not be empty")]
    EmptyMessage,
}

impl Error {
    /// Create a new error, panicking if validation fails.
    ///
    /// # Panics
    ///
    /// Panics when `message` is blank. Use [`Error::try_new`] for untrusted
    /// input.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        match Self::try_new(code, message) {
            Ok(value) => value,
            Err(err) => panic!("error messages must satisfy validation: {err}"),
        }
    }

    /// Fallible constructor that validates the message content.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorValidationError::EmptyMessage`] for blank messages.
    pub fn try_new(code: ErrorCode, message: impl Into<String>) -> Result<Self, ErrorValidationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ErrorValidationError::EmptyMessage);
        }
        Ok(Self {
            code,
            message,
            details: None,
        })
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary error details.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details to the error.
    ///
    /// # Examples
    /// ```
    /// use sqlview_backend::domain::Error;
    /// use serde_json::json;
    ///
    /// let err = Error::invalid_request("bad").with_details(json!({ "field": "uid" }));
    /// assert!(err.details().is_some());
    /// ```
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Convenience constructor for [`ErrorCode::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Convenience constructor for [`ErrorCode::UpstreamFailure`].
    pub fn upstream_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamFailure, message)
    }

    /// Convenience constructor for [`ErrorCode::UnrecognizedResponse`].
    pub fn unrecognized_response(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnrecognizedResponse, message)
    }

    /// Convenience constructor for [`ErrorCode::Cancelled`].
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, message)
    }

    /// Convenience constructor for [`ErrorCode::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl From<SqlViewExecutionError> for Error {
    fn from(value: SqlViewExecutionError) -> Self {
        let message = value.to_string();
        match value {
            SqlViewExecutionError::InvalidRequest { .. } => Self::invalid_request(message),
            SqlViewExecutionError::MissingParameter(missing) => Self::invalid_request(message)
                .with_details(json!({ "parameter": missing.name() })),
            SqlViewExecutionError::UnrecognizedResponseShape { page, shape } => {
                Self::unrecognized_response(message).with_details(json!({
                    "page": page,
                    "observed": shape.observed_kind(),
                    "keys": shape.keys(),
                }))
            }
            SqlViewExecutionError::Upstream {
                page,
                attempts,
                source,
            } => Self::upstream_failure(message).with_details(json!({
                "page": page,
                "attempts": attempts,
                "status": source.http_status(),
                "retryable": source.is_retryable(),
            })),
            SqlViewExecutionError::Cancelled { pages_fetched } => {
                Self::cancelled(message).with_details(json!({ "pagesFetched": pages_fetched }))
            }
        }
    }
}

impl From<InvalidUid> for Error {
    fn from(value: InvalidUid) -> Self {
        let details = json!({ "uid": value.uid() });
        Self::invalid_request(value.to_string()).with_details(details)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDto {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<Error> for ErrorDto {
    fn from(value: Error) -> Self {
        Self {
            code: value.code,
            message: value.message,
            details: value.details,
        }
    }
}

impl TryFrom<ErrorDto> for Error {
    type Error = ErrorValidationError;

    fn try_from(value: ErrorDto) -> Result<Self, Self::Error> {
        let ErrorDto {
            code,
            message,
            details,
        } = value;

        let mut error = Error::try_new(code, message)?;
        error.details = details;
        Ok(error)
    }
}
