//! Reference lookup collaborator and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://bible-api.com";

/// Upstream answer for one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupOutcome {
    /// Whether the upstream recognized the reference.
    pub ok: bool,
    /// Resolved passage text, when available.
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("reference service unavailable: {0}")]
    Unavailable(String),

    #[error("reference lookup timed out")]
    Timeout,
}

/// An intermittently available reference service.
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn lookup(&self, reference: &str) -> Result<LookupOutcome, LookupError>;
}

/// bible-api compatible lookup: `GET {base}/{reference}` answering
/// `{"text": ...}`, with 404 for unknown references.
pub struct HttpReferenceLookup {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl HttpReferenceLookup {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid reference service URL {base_url:?}: {e}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("reference service URL {base_url} cannot be a base");
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, reference: &str) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(reference);
        }
        url
    }
}

#[derive(Debug, Deserialize)]
struct PassageResponse {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl ReferenceLookup for HttpReferenceLookup {
    async fn lookup(&self, reference: &str) -> Result<LookupOutcome, LookupError> {
        let url = self.url_for(reference);
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Timeout
            } else {
                LookupError::Unavailable(e.to_string())
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(LookupOutcome { ok: false, text: None }),
            status if status.is_success() => {
                let body: PassageResponse = response
                    .json()
                    .await
                    .map_err(|e| LookupError::Unavailable(format!("unreadable response: {e}")))?;
                let text = body.text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
                Ok(LookupOutcome { ok: true, text })
            }
            status => Err(LookupError::Unavailable(format!("upstream returned {status}"))),
        }
    }
}
