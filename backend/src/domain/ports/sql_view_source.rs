//! Driven port for fetching one page of SQL view results.
//!
//! The domain owns the request shape and error taxonomy; adapters only move
//! bytes and report failures in these terms.

use std::collections::BTreeMap;

use async_trait::async_trait;
use pagination::PageNumber;
use serde_json::Value;

use super::define_port_error;
use crate::domain::sql_view_parameters::SqlViewParameters;

/// One page request for a SQL view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlViewPageRequest {
    /// Server-side SQL view identifier.
    pub sql_view_id: String,
    /// Resolved template variables, sent as `var=name:value`.
    pub parameters: SqlViewParameters,
    /// Column criteria, sent as `criteria=name:value`.
    pub filters: BTreeMap<String, String>,
    /// Page to fetch.
    pub page: PageNumber,
}

/// One undecoded page body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPage {
    /// Parsed JSON body; its layout is not yet known.
    pub body: Value,
}

impl RawPage {
    /// Wrap a parsed body.
    pub fn new(body: Value) -> Self {
        Self { body }
    }
}

define_port_error! {
    /// Errors surfaced while fetching a page.
    pub enum SqlViewSourceError {
        /// Network transport failed before a response arrived.
        Transport {
            /// Transport failure description.
            message: String,
        } => "sql view transport failed: {message}",
        /// The request exceeded its timeout.
        Timeout {
            /// Which limit elapsed.
            message: String,
        } => "sql view request timed out: {message}",
        /// The server answered with a non-success status.
        Status {
            /// HTTP status code.
            status: u16,
            /// Status line and body preview.
            message: String,
        } => "sql view request failed with {message}",
        /// The body was not valid JSON.
        Decode {
            /// Decoder failure description.
            message: String,
        } => "sql view response decode failed: {message}",
        /// The adapter could not build or authorise the request.
        InvalidRequest {
            /// What made the request unusable.
            message: String,
        } => "sql view request invalid: {message}",
    }
}

impl SqlViewSourceError {
    /// Whether retrying this error is expected to help.
    ///
    /// Transport failures, timeouts and server-side (5xx) statuses are
    /// retryable; client-side (4xx) statuses never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode { .. } | Self::InvalidRequest { .. } => false,
        }
    }

    /// HTTP status when the server answered.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Port for fetching SQL view pages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SqlViewSource: Send + Sync {
    /// Fetch one page.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use sqlview_backend::domain::ports::{FixtureSqlViewSource, SqlViewPageRequest, SqlViewSource};
    ///
    /// let source = FixtureSqlViewSource;
    /// let page = source.fetch_page(&request).await?;
    /// assert!(page.body.is_array());
    /// # Ok::<(), sqlview_backend::domain::ports::SqlViewSourceError>(())
    /// ```
    async fn fetch_page(&self, request: &SqlViewPageRequest) -> Result<RawPage, SqlViewSourceError>;
}

/// Fixture implementation returning an empty result set.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureSqlViewSource;

#[async_trait]
impl SqlViewSource for FixtureSqlViewSource {
    async fn fetch_page(&self, _request: &SqlViewPageRequest) -> Result<RawPage, SqlViewSourceError> {
        Ok(RawPage::new(Value::Array(Vec::new())))
    }
}
