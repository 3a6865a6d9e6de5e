//! Attempt-local error outcomes for one page request.
//!
//! These states keep the retry decision explicit inside the page loop
//! without leaking attempt-control details into the public API.

use crate::domain::ports::SqlViewSourceError;

pub(super) enum AttemptError {
    Retryable(SqlViewSourceError),
    Rejected(SqlViewSourceError),
}

impl AttemptError {
    pub(super) fn classify(error: SqlViewSourceError) -> Self {
        if error.is_retryable() {
            Self::Retryable(error)
        } else {
            Self::Rejected(error)
        }
    }
}
