//! Driven port supplying the opaque `Authorization` header value.

use zeroize::Zeroizing;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced while obtaining credentials.
    pub enum CredentialError {
        /// No credentials are configured or they could not be read.
        Unavailable {
            /// What was missing or unreadable.
            message: String,
        } => "credentials unavailable: {message}",
    }
}

/// Port for the external credential collaborator.
///
/// The returned value is forwarded verbatim and wiped when dropped; the
/// pipeline never inspects or stores it.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialProvider: Send + Sync {
    /// Full `Authorization` header value, e.g. `Basic ...` or `ApiToken ...`.
    fn authorization_header(&self) -> Result<Zeroizing<String>, CredentialError>;
}
