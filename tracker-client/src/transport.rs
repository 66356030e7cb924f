use crate::request::Payload;
use async_trait::async_trait;
use reqwest::redirect::Policy;
use std::time::Duration;
use url::Url;

/// Upper bound for connecting to and hearing back from the tracking service.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("invalid tracking URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("tracking request to {0} timed out")]
    Timeout(String),
    #[error("tracking request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    /// Drained response body, only kept for unsuccessful statuses.
    pub body: Option<String>,
}

/// Sends one tracking payload. Implementations make exactly one attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, url: &str, payload: &Payload)
    -> Result<TransportResponse, TransportError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            // A redirect is reported as the final status, not followed.
            .redirect(Policy::none())
            .build()?;

        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        url: &str,
        payload: &Payload,
    ) -> Result<TransportResponse, TransportError> {
        let parsed = Url::parse(url).map_err(|source| TransportError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        // Use host as identifier for error messages
        let upstream_identifier = parsed.host_str().unwrap_or(url).to_string();

        let response = self
            .client
            .post(parsed)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(upstream_identifier.clone())
                } else {
                    TransportError::Request(e)
                }
            })?;

        let status = response.status().as_u16();
        let body = if status >= 300 {
            match response.text().await {
                Ok(text) => Some(text),
                Err(e) => {
                    tracing::debug!(error = %e, "could not read tracking service response body");
                    None
                }
            }
        } else {
            None
        };

        Ok(TransportResponse { status, body })
    }
}
