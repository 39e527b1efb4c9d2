use async_trait::async_trait;
use linecomp_config::{
    CompletionProviderKind, DEFAULT_GEMINI_API_KEY_ENV, DEFAULT_GEMINI_MODEL,
    DEFAULT_OLLAMA_ENDPOINT, DEFAULT_OLLAMA_MODEL, LinecompConfig,
};
use linecomp_core::Secret;
use serde::de::DeserializeOwned;
use thiserror::Error;

mod gemini;
mod ollama;
mod output;
mod prompt;
mod reader;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use output::{EXPECTED_COMPLETIONS, parse_completion_output};
pub use prompt::{CompletionPrompt, SYSTEM_PROMPT, render_user_prompt};
pub use reader::{FetchError, JinaReader, UrlReader};

#[derive(Debug, Error)]
pub enum InferError {
    #[error("missing API key in {0}")]
    MissingApiKey(String),
    #[error("config load failed: {0}")]
    Config(#[from] linecomp_config::ConfigError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response decoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("invalid completion output: {0}")]
    InvalidOutput(String),
}

/// An LLM that turns a marked-up prompt into candidate lines.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &CompletionPrompt) -> Result<Vec<String>, InferError>;
}

/// Deterministic provider used when no model is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockProvider;

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn complete(&self, prompt: &CompletionPrompt) -> Result<Vec<String>, InferError> {
        if !prompt.close_context.contains(prompt.marker.as_str()) {
            return Ok(Vec::new());
        }
        Ok(vec![
            "pass".to_owned(),
            "return None".to_owned(),
            "raise NotImplementedError".to_owned(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderOverrides {
    pub provider: Option<CompletionProviderKind>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key_env: Option<String>,
}

pub struct LoadedProvider {
    pub provider: Box<dyn CompletionProvider>,
    pub provider_name: String,
    pub model_name: String,
}

impl std::fmt::Debug for LoadedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedProvider")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .finish()
    }
}

pub fn load_provider(
    config: &LinecompConfig,
    overrides: ProviderOverrides,
) -> Result<LoadedProvider, InferError> {
    let selected_provider = overrides.provider.unwrap_or(config.completion.provider);
    let selected_model = first_non_empty(overrides.model, config.completion.model.clone());
    let selected_endpoint = first_non_empty(overrides.endpoint, config.completion.endpoint.clone());
    let selected_api_key_env = first_non_empty(
        overrides.api_key_env,
        Some(config.completion.api_key_env.clone()),
    )
    .unwrap_or_else(|| DEFAULT_GEMINI_API_KEY_ENV.to_owned());

    match selected_provider {
        CompletionProviderKind::Auto => match Secret::from_env(&selected_api_key_env) {
            Some(api_key) => {
                let model = selected_model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_owned());
                Ok(LoadedProvider {
                    provider: Box::new(GeminiProvider::new(api_key, model.clone())),
                    provider_name: CompletionProviderKind::Gemini.as_str().to_owned(),
                    model_name: model,
                })
            }
            None => Ok(mock_provider()),
        },
        CompletionProviderKind::Mock => Ok(mock_provider()),
        CompletionProviderKind::Gemini => {
            let provider = GeminiProvider::from_env_key(&selected_api_key_env, selected_model)?;
            Ok(LoadedProvider {
                model_name: provider.model_name().to_owned(),
                provider: Box::new(provider),
                provider_name: CompletionProviderKind::Gemini.as_str().to_owned(),
            })
        }
        CompletionProviderKind::Ollama => {
            let provider = OllamaProvider::new(
                selected_endpoint.unwrap_or_else(|| DEFAULT_OLLAMA_ENDPOINT.to_owned()),
                selected_model.unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_owned()),
            );
            Ok(LoadedProvider {
                model_name: provider.model_name().to_owned(),
                provider: Box::new(provider),
                provider_name: CompletionProviderKind::Ollama.as_str().to_owned(),
            })
        }
    }
}

fn mock_provider() -> LoadedProvider {
    LoadedProvider {
        provider: Box::new(MockProvider),
        provider_name: CompletionProviderKind::Mock.as_str().to_owned(),
        model_name: "mock".to_owned(),
    }
}

fn first_non_empty(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    normalize_optional(primary).or_else(|| normalize_optional(fallback))
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Decodes a 2xx JSON body. Other statuses become [`InferError::Status`]
/// carrying the response body.
pub(crate) async fn read_json_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, InferError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %body, "completion model request failed");
        return Err(InferError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}
