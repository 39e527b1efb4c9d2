use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CompletionPrompt, CompletionProvider, InferError, read_json_response};

const FIM_PREFIX: &str = "<|fim_prefix|>";
const FIM_SUFFIX: &str = "<|fim_suffix|>";
const FIM_MIDDLE: &str = "<|fim_middle|>";

/// Fill-in-the-middle completion against a local ollama server.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            model,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

pub(crate) fn fim_prompt(prompt: &CompletionPrompt) -> String {
    let (prefix, suffix) = prompt.split_at_marker();
    format!("{FIM_PREFIX}{prefix}{FIM_SUFFIX}{suffix}{FIM_MIDDLE}")
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    async fn complete(&self, prompt: &CompletionPrompt) -> Result<Vec<String>, InferError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: fim_prompt(prompt),
            raw: true,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body)
            .send()
            .await?;
        let response: GenerateResponse = read_json_response(response).await?;

        // A FIM model answers with the middle only; keep its first line.
        let line = response
            .response
            .lines()
            .map(str::trim_end)
            .find(|line| !line.trim().is_empty())
            .map(|line| line.trim_start().to_owned());
        Ok(line.into_iter().collect())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    raw: bool,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fim_prompt_cuts_at_marker() {
        let prompt = CompletionPrompt::new(
            "def quicksort(arr):\n    /*@@*/\n    return arr",
            "/*@@*/",
            "",
        );
        assert_eq!(
            fim_prompt(&prompt),
            "<|fim_prefix|>def quicksort(arr):\n    <|fim_suffix|>\n    return arr<|fim_middle|>"
        );
    }
}
