//! HTTP client for a running `linecompd serve`.

use std::time::Duration;

use async_trait::async_trait;
use linecomp_config::BackendConfig;
use linecomp_core::protocol::{
    SuggestRequest, SuggestResponse, SymbolLocationsRequest, SymbolLocationsResponse,
    SymbolSourceRequest, SymbolSourceResponse,
};
use linecomp_core::{SymbolImplementationLocation, SymbolReference, SymbolSource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::index::{IndexError, ReferenceFinder};
use crate::service::{CompletionService, ServiceError};
use crate::source::SymbolSourceFetcher;

pub const SUGGEST_ROUTE: &str = "/suggest";
pub const SYMBOL_LOCATIONS_ROUTE: &str = "/symbol_locations";
pub const SYMBOL_SOURCE_ROUTE: &str = "/symbol_source";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend response decoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(config.url.clone(), config.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, route: &str, body: &Req) -> Result<Resp, BackendError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{route}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), body = %text, "backend request failed");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn suggest(&self, request: &SuggestRequest) -> Result<Vec<String>, BackendError> {
        let response: SuggestResponse = self.post(SUGGEST_ROUTE, request).await?;
        Ok(response.response)
    }

    pub async fn symbol_locations(
        &self,
        request: &SymbolLocationsRequest,
    ) -> Result<Vec<SymbolReference>, BackendError> {
        let response: SymbolLocationsResponse = self.post(SYMBOL_LOCATIONS_ROUTE, request).await?;
        Ok(response.references)
    }

    pub async fn symbol_source(
        &self,
        request: &SymbolSourceRequest,
    ) -> Result<Vec<SymbolSource>, BackendError> {
        let response: SymbolSourceResponse = self.post(SYMBOL_SOURCE_ROUTE, request).await?;
        Ok(response.sources)
    }
}

#[async_trait]
impl ReferenceFinder for BackendClient {
    async fn find_references(
        &self,
        path: &str,
        start_line: usize,
        end_line: usize,
    ) -> Result<Vec<SymbolReference>, IndexError> {
        let request = SymbolLocationsRequest {
            path: path.to_owned(),
            start_line,
            end_line,
        };
        Ok(self.symbol_locations(&request).await?)
    }
}

#[async_trait]
impl SymbolSourceFetcher for BackendClient {
    async fn fetch_sources(
        &self,
        locations: &[SymbolImplementationLocation],
    ) -> Result<Vec<SymbolSource>, IndexError> {
        let request = SymbolSourceRequest {
            locations: locations.to_vec(),
        };
        Ok(self.symbol_source(&request).await?)
    }
}

#[async_trait]
impl CompletionService for BackendClient {
    async fn suggest(&self, request: &SuggestRequest) -> Result<Vec<String>, ServiceError> {
        Ok(BackendClient::suggest(self, request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = BackendClient::new("http://127.0.0.1:7524/", Duration::from_secs(1));
        assert_eq!(client.base_url(), "http://127.0.0.1:7524");
    }
}
