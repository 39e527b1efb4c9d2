use async_trait::async_trait;
use linecomp_config::DEFAULT_GEMINI_MODEL;
use linecomp_core::Secret;
use serde::{Deserialize, Serialize};

use crate::{
    CompletionPrompt, CompletionProvider, InferError, SYSTEM_PROMPT, parse_completion_output,
    read_json_response,
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_THINKING_BUDGET: u32 = 128;

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Secret,
    model: String,
    api_base: String,
}

impl GeminiProvider {
    pub fn from_env_key(api_key_env: &str, model: Option<String>) -> Result<Self, InferError> {
        let api_key = Secret::from_env(api_key_env)
            .ok_or_else(|| InferError::MissingApiKey(api_key_env.to_owned()))?;
        let model = model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_owned());
        Ok(Self::new(api_key, model))
    }

    pub fn new(api_key: Secret, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            api_base: GEMINI_API_BASE.to_owned(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn endpoint_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    async fn request_text(&self, prompt: &CompletionPrompt) -> Result<String, InferError> {
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_owned(),
                }],
            },
            contents: vec![Content {
                role: Some("user".to_owned()),
                parts: vec![Part {
                    text: prompt.document.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                thinking_config: ThinkingConfig {
                    thinking_budget: GEMINI_THINKING_BUDGET,
                },
            },
        };

        let response = self
            .client
            .post(self.endpoint_url())
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await?;
        let response: GenerateContentResponse = read_json_response(response).await?;

        response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                InferError::InvalidResponse("missing candidates[0].content.parts[].text".to_owned())
            })
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(&self, prompt: &CompletionPrompt) -> Result<Vec<String>, InferError> {
        let text = self.request_text(prompt).await?;
        tracing::debug!(model = %self.model, chars = text.len(), "gemini completion received");
        parse_completion_output(&text)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}
