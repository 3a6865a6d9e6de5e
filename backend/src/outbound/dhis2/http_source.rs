//! Reqwest-backed DHIS2 SQL view source adapter.
//!
//! This adapter owns transport details only: URL and query serialisation,
//! forwarding the opaque authorization header, timeout and HTTP error
//! mapping, and JSON decoding. It never interprets the body's layout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use crate::domain::ports::{
    CredentialProvider, RawPage, SqlViewPageRequest, SqlViewSource, SqlViewSourceError,
};

const DEFAULT_USER_AGENT: &str = "sqlview-backend/0.1";

/// Outbound identity sent with every request.
pub struct Dhis2HttpIdentity {
    /// HTTP user-agent sent to DHIS2.
    pub user_agent: String,
}

impl Default for Dhis2HttpIdentity {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

/// SQL view source that performs HTTP GET requests against one DHIS2 API.
pub struct Dhis2HttpSqlViewSource {
    client: Client,
    base_url: Url,
    credentials: Arc<dyn CredentialProvider>,
    user_agent: String,
}

impl Dhis2HttpSqlViewSource {
    /// Build an adapter using a reqwest client with an explicit request timeout.
    /// ```rust,ignore
    /// let source = Dhis2HttpSqlViewSource::new(base_url, timeout, credentials)?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(
        base_url: Url,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, reqwest::Error> {
        Self::with_identity(base_url, timeout, credentials, Dhis2HttpIdentity::default())
    }

    /// Build an adapter with an explicit outbound identity.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn with_identity(
        base_url: Url,
        timeout: Duration,
        credentials: Arc<dyn CredentialProvider>,
        identity: Dhis2HttpIdentity,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            credentials,
            user_agent: identity.user_agent,
        })
    }
}

#[async_trait]
impl SqlViewSource for Dhis2HttpSqlViewSource {
    async fn fetch_page(&self, request: &SqlViewPageRequest) -> Result<RawPage, SqlViewSourceError> {
        let url = build_page_url(&self.base_url, request)?;
        let authorization = self
            .credentials
            .authorization_header()
            .map_err(|error| SqlViewSourceError::invalid_request(error.to_string()))?;
        let mut authorization = HeaderValue::from_str(authorization.as_str()).map_err(|_| {
            SqlViewSourceError::invalid_request("authorization header contains invalid characters")
        })?;
        authorization.set_sensitive(true);

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }

        parse_body(body.as_ref()).map(RawPage::new)
    }
}

fn build_page_url(base_url: &Url, request: &SqlViewPageRequest) -> Result<Url, SqlViewSourceError> {
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|()| SqlViewSourceError::invalid_request("base url cannot carry a path"))?
        .pop_if_empty()
        .extend(["sqlViews", request.sql_view_id.as_str(), "data.json"]);

    {
        let mut query = url.query_pairs_mut();
        for (name, value) in request.parameters.iter() {
            query.append_pair("var", &format!("{name}:{value}"));
        }
        for (name, value) in &request.filters {
            query.append_pair("criteria", &format!("{name}:{value}"));
        }
        query.append_pair("page", &request.page.get().to_string());
    }
    Ok(url)
}

fn parse_body(body: &[u8]) -> Result<Value, SqlViewSourceError> {
    serde_json::from_slice(body).map_err(|error| {
        SqlViewSourceError::decode(format!(
            "invalid SQL view JSON payload: {error}; body: {}",
            body_preview(body)
        ))
    })
}

fn map_transport_error(error: reqwest::Error) -> SqlViewSourceError {
    if error.is_timeout() {
        SqlViewSourceError::timeout(error.to_string())
    } else {
        SqlViewSourceError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> SqlViewSourceError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::GATEWAY_TIMEOUT => SqlViewSourceError::timeout(message),
        _ => SqlViewSourceError::status(status.as_u16(), message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
