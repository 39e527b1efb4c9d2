use std::time::Duration;

use async_trait::async_trait;
use linecomp_config::ReaderConfig;
use linecomp_core::Secret;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("reader returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reader returned an empty document")]
    Empty,
}

/// Renders a web page as plain text.
#[async_trait]
pub trait UrlReader: Send + Sync {
    async fn read(&self, url: &str) -> Result<String, FetchError>;
}

/// Reader backed by the `r.jina.ai` proxy: `GET {endpoint}{url}`.
#[derive(Debug, Clone)]
pub struct JinaReader {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<Secret>,
}

impl JinaReader {
    pub fn new(endpoint: impl Into<String>, api_key: Option<Secret>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }

    /// A stored key wins over the one named by `reader.api_key_env`.
    pub fn from_config(config: &ReaderConfig, stored_key: Option<&str>) -> Self {
        let api_key = stored_key
            .and_then(Secret::non_blank)
            .or_else(|| Secret::from_env(&config.api_key_env));
        Self::new(config.endpoint.clone(), api_key, config.timeout())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_url(&self, url: &str) -> String {
        format!("{}{}", self.endpoint, url.trim())
    }
}

#[async_trait]
impl UrlReader for JinaReader {
    async fn read(&self, url: &str) -> Result<String, FetchError> {
        let mut request = self
            .client
            .get(self.request_url(url))
            .header(reqwest::header::ACCEPT, "text/plain");
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), body = %body, "url reader request failed");
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(body)
    }
}
