//! The completion service seam and its in-process implementation.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use linecomp_core::protocol::{SuggestRequest, ValidationError};
use linecomp_infer::{CompletionPrompt, CompletionProvider, InferError, render_user_prompt};
use thiserror::Error;

use crate::backend::BackendError;
use crate::compiler::{CompileRequest, ContextCompiler};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Infer(#[from] InferError),
}

/// Turns a suggest payload into ranked candidate lines. An empty list means
/// "no suggestion", not failure.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn suggest(&self, request: &SuggestRequest) -> Result<Vec<String>, ServiceError>;
}

/// Compiles user context, renders the prompt and calls the model directly.
/// The `serve` command exposes this over HTTP.
#[derive(Clone)]
pub struct InProcessCompletionService {
    provider: Arc<dyn CompletionProvider>,
    compiler: ContextCompiler,
    marker: String,
    workspace_root: Option<PathBuf>,
}

impl InProcessCompletionService {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        compiler: ContextCompiler,
        marker: impl Into<String>,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        Self {
            provider,
            compiler,
            marker: marker.into(),
            workspace_root,
        }
    }

    /// The user turn sent to the model for `request`.
    pub async fn render_prompt(&self, request: &SuggestRequest) -> CompletionPrompt {
        let compile = CompileRequest::from_suggest(request, self.workspace_root.clone());
        let user_context = if compile.is_empty() {
            None
        } else {
            Some(self.compiler.compile(&compile).await)
        };
        let document = render_user_prompt(
            &request.close_context,
            &request.symbol_implementations,
            user_context.as_deref(),
        );
        CompletionPrompt::new(request.close_context.as_str(), self.marker.as_str(), document)
    }
}

#[async_trait]
impl CompletionService for InProcessCompletionService {
    async fn suggest(&self, request: &SuggestRequest) -> Result<Vec<String>, ServiceError> {
        request.validate()?;
        let prompt = self.render_prompt(request).await;
        tracing::debug!(
            symbols = request.symbol_implementations.len(),
            user_items = request.user_context.len(),
            prompt_chars = prompt.document.len(),
            "calling completion provider"
        );
        Ok(self.provider.complete(&prompt).await?)
    }
}
