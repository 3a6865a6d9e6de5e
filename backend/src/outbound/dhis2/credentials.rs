//! Static credential providers.
//!
//! Secrets are held in [`Zeroizing`] buffers and never appear in `Debug`
//! output.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use zeroize::Zeroizing;

use crate::domain::ports::{CredentialError, CredentialProvider};

/// HTTP Basic credentials.
pub struct BasicAuthCredentials {
    username: String,
    password: Zeroizing<String>,
}

impl BasicAuthCredentials {
    /// Wrap a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

impl fmt::Debug for BasicAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl CredentialProvider for BasicAuthCredentials {
    fn authorization_header(&self) -> Result<Zeroizing<String>, CredentialError> {
        if self.username.trim().is_empty() {
            return Err(CredentialError::unavailable("username is blank"));
        }
        let pair = Zeroizing::new(format!("{}:{}", self.username, self.password.as_str()));
        Ok(Zeroizing::new(format!(
            "Basic {}",
            STANDARD.encode(pair.as_bytes())
        )))
    }
}

/// DHIS2 personal access token.
pub struct ApiTokenCredentials {
    token: Zeroizing<String>,
}

impl ApiTokenCredentials {
    /// Wrap a token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }
}

impl fmt::Debug for ApiTokenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiTokenCredentials").finish_non_exhaustive()
    }
}

impl CredentialProvider for ApiTokenCredentials {
    fn authorization_header(&self) -> Result<Zeroizing<String>, CredentialError> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(CredentialError::unavailable("api token is blank"));
        }
        Ok(Zeroizing::new(format!("ApiToken {token}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_credentials_encode_user_and_password() {
        let header = BasicAuthCredentials::new("admin", "district")
            .authorization_header()
            .expect("header builds");
        assert_eq!(header.as_str(), "Basic YWRtaW46ZGlzdHJpY3Q=");
    }

    #[test]
    fn token_credentials_use_the_api_token_scheme() {
        let header = ApiTokenCredentials::new(" d2pat_abc ")
            .authorization_header()
            .expect("header builds");
        assert_eq!(header.as_str(), "ApiToken d2pat_abc");
    }

    #[test]
    fn blank_secrets_are_unavailable() {
        assert!(matches!(
            ApiTokenCredentials::new("  ").authorization_header(),
            Err(CredentialError::Unavailable { .. })
        ));
        assert!(matches!(
            BasicAuthCredentials::new("", "pw").authorization_header(),
            Err(CredentialError::Unavailable { .. })
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let rendered = format!(
            "{:?} {:?}",
            BasicAuthCredentials::new("admin", "district"),
            ApiTokenCredentials::new("d2pat_abc")
        );
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("district"));
        assert!(!rendered.contains("d2pat_abc"));
    }
}
