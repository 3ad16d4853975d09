use crate::assembler;
use crate::config::LegislativeApi;
use crate::types::PersonRecord;
use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;
use url::Url;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("upstream timed out")]
    Timeout,
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("could not decode upstream response: {0}")]
    Decode(String),
    /// The upstream answered successfully but reported an error in the body.
    #[error("upstream reported no match: {0}")]
    NoMatch(String),
}

impl UpstreamError {
    /// Status to report to the caller. Upstream statuses are passed through,
    /// everything else is a generic bad gateway.
    pub fn status_code(&self) -> StatusCode {
        match self {
            UpstreamError::Status(code) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            // The request URL carries the API key and must not end up in logs.
            UpstreamError::Transport(err.without_url().to_string())
        }
    }
}

/// Read-only operations offered by the legislative-data API.
///
/// Each call is a single request. Nothing is retried here; the pipeline
/// recovers by trying a different operation instead.
#[async_trait]
pub trait LegislativeData: Send + Sync {
    async fn lookup_by_postcode(&self, postcode: &str) -> Result<PersonRecord, UpstreamError>;

    async fn lookup_by_person_id(&self, person_id: &str) -> Result<PersonRecord, UpstreamError>;

    async fn lookup_by_constituency(
        &self,
        constituency: &str,
    ) -> Result<PersonRecord, UpstreamError>;
}

/// Client for a TheyWorkForYou-style API.
pub struct TheyWorkForYouClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl TheyWorkForYouClient {
    pub fn new(config: &LegislativeApi) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        // Url::join replaces the last segment unless the base ends in a slash
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(TheyWorkForYouClient {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    async fn call(
        &self,
        function: &str,
        params: &[(&str, &str)],
    ) -> Result<PersonRecord, UpstreamError> {
        let url = self
            .base_url
            .join(function)
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("output", "js"), ("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(function, status = %status, "upstream returned non-success status");
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let payload: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Decode(e.without_url().to_string())
            }
        })?;

        if let Some(message) = assembler::signalled_error(&payload) {
            return Err(UpstreamError::NoMatch(message));
        }

        Ok(assembler::normalize(&payload))
    }
}

#[async_trait]
impl LegislativeData for TheyWorkForYouClient {
    async fn lookup_by_postcode(&self, postcode: &str) -> Result<PersonRecord, UpstreamError> {
        self.call("getMP", &[("postcode", postcode)]).await
    }

    async fn lookup_by_person_id(&self, person_id: &str) -> Result<PersonRecord, UpstreamError> {
        self.call("getPerson", &[("id", person_id)]).await
    }

    async fn lookup_by_constituency(
        &self,
        constituency: &str,
    ) -> Result<PersonRecord, UpstreamError> {
        self.call("getMP", &[("constituency", constituency)]).await
    }
}
