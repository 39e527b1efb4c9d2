//! Cursor to candidates, end to end.

use std::path::PathBuf;
use std::sync::Arc;

use linecomp_config::PipelineConfig;
use linecomp_core::{ContextInstance, Position, SymbolSource};

use crate::compiler::{CompileRequest, ContextCompiler};
use crate::index::{ReferenceFinder, SymbolIndex};
use crate::request::build_suggest_request;
use crate::resolver::ImplementationResolver;
use crate::scope::{NearCursorWindow, WindowOptions, near_cursor_window};
use crate::service::CompletionService;
use crate::source::{SymbolSourceFetcher, fetch_symbol_sources};
use crate::trigger::TriggerQueue;

pub const NO_SUGGESTION_NOTICE: &str = "No suggestion returned from backend";

/// One document as the editor sees it, with a 0-based cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCursor {
    pub path: String,
    pub text: String,
    pub cursor: Position,
}

impl DocumentCursor {
    pub fn new(path: impl Into<String>, text: impl Into<String>, cursor: Position) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            cursor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    References,
    SymbolSources,
    Service,
}

impl AbortReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::References => "reference lookup failed",
            Self::SymbolSources => "symbol source fetch failed",
            Self::Service => "completion service failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// No pending trigger for the document.
    NotTriggered,
    Suggestions(Vec<String>),
    NoSuggestion,
    Aborted(AbortReason),
}

impl CompletionOutcome {
    pub fn candidates(&self) -> &[String] {
        match self {
            Self::Suggestions(candidates) => candidates,
            _ => &[],
        }
    }

    /// Informational message for the user, if any.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Self::NoSuggestion | Self::Aborted(_) => Some(NO_SUGGESTION_NOTICE),
            Self::NotTriggered | Self::Suggestions(_) => None,
        }
    }
}

pub struct CompletionPipeline {
    index: Arc<dyn SymbolIndex>,
    references: Arc<dyn ReferenceFinder>,
    sources: Arc<dyn SymbolSourceFetcher>,
    service: Arc<dyn CompletionService>,
    resolver: ImplementationResolver,
    window: WindowOptions,
    expand_to_class: bool,
}

impl CompletionPipeline {
    pub fn new(
        index: Arc<dyn SymbolIndex>,
        references: Arc<dyn ReferenceFinder>,
        sources: Arc<dyn SymbolSourceFetcher>,
        service: Arc<dyn CompletionService>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            index,
            references,
            sources,
            service,
            resolver: ImplementationResolver::from_config(config),
            window: WindowOptions::from(config),
            expand_to_class: config.expand_to_class,
        }
    }

    pub fn with_resolver(mut self, resolver: ImplementationResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_expand_to_class(mut self, expand_to_class: bool) -> Self {
        self.expand_to_class = expand_to_class;
        self
    }

    /// Marked-up window around the cursor. Without a scope tree the radius
    /// fallback applies.
    pub async fn near_cursor(&self, document: &DocumentCursor) -> NearCursorWindow {
        let forest = match self.index.scope_tree(&document.path).await {
            Ok(forest) => forest,
            Err(err) => {
                tracing::warn!(path = %document.path, error = %err, "scope tree unavailable");
                Vec::new()
            }
        };
        near_cursor_window(&document.text, document.cursor, &forest, &self.window)
    }

    /// Sources of the symbols called inside `window`.
    pub async fn symbol_sources(
        &self,
        document: &DocumentCursor,
        window: &NearCursorWindow,
    ) -> Result<Vec<SymbolSource>, AbortReason> {
        let references = self
            .references
            .find_references(&document.path, window.start_line, window.end_line)
            .await
            .map_err(|err| {
                tracing::warn!(path = %document.path, error = %err, "reference lookup failed");
                AbortReason::References
            })?;

        let locations = self
            .resolver
            .resolve(
                self.index.as_ref(),
                &document.path,
                &references,
                self.expand_to_class,
            )
            .await;
        tracing::debug!(
            references = references.len(),
            resolved = locations.len(),
            "resolved symbol implementations"
        );

        fetch_symbol_sources(self.sources.as_ref(), &locations)
            .await
            .ok_or(AbortReason::SymbolSources)
    }

    /// Runs the completion flow. Any upstream failure aborts with no
    /// candidates.
    pub async fn complete(
        &self,
        document: &DocumentCursor,
        instance: Option<&ContextInstance>,
    ) -> CompletionOutcome {
        let window = self.near_cursor(document).await;
        let sources = match self.symbol_sources(document, &window).await {
            Ok(sources) => sources,
            Err(reason) => return aborted(document, reason),
        };

        let request = build_suggest_request(window.close_context, sources, instance);
        match self.service.suggest(&request).await {
            Ok(candidates) if candidates.is_empty() => {
                tracing::info!(path = %document.path, "{}", NO_SUGGESTION_NOTICE);
                CompletionOutcome::NoSuggestion
            }
            Ok(candidates) => CompletionOutcome::Suggestions(candidates),
            Err(err) => {
                tracing::warn!(path = %document.path, error = %err, "completion service failed");
                aborted(document, AbortReason::Service)
            }
        }
    }

    /// Provider entry point: acts only when a trigger for this document is
    /// pending, and consumes it.
    pub async fn provide(
        &self,
        triggers: &TriggerQueue,
        document: &DocumentCursor,
        instance: Option<&ContextInstance>,
    ) -> CompletionOutcome {
        let Some(intent) = triggers.take(&document.path) else {
            return CompletionOutcome::NotTriggered;
        };
        tracing::debug!(path = %document.path, trigger = intent.id, "consuming completion trigger");
        self.complete(document, instance).await
    }
}

fn aborted(document: &DocumentCursor, reason: AbortReason) -> CompletionOutcome {
    tracing::info!(path = %document.path, reason = reason.as_str(), "completion request aborted");
    CompletionOutcome::Aborted(reason)
}

/// Compiles an instance for the clipboard. With a cursor, the implementations
/// of the symbols near it are appended as supplementary text; if that lookup
/// fails the document is produced without them.
pub async fn copy_context(
    compiler: &ContextCompiler,
    instance: &ContextInstance,
    workspace_root: Option<PathBuf>,
    cursor: Option<(&CompletionPipeline, &DocumentCursor)>,
) -> String {
    let mut request = CompileRequest::from_instance(instance, workspace_root);
    if let Some((pipeline, document)) = cursor {
        let window = pipeline.near_cursor(document).await;
        match pipeline.symbol_sources(document, &window).await {
            Ok(sources) => request
                .supplementary_text
                .extend(sources.into_iter().map(|source| source.text)),
            Err(reason) => {
                tracing::debug!(path = %document.path, reason = reason.as_str(), "copying context without implementations");
            }
        }
    }
    compiler.compile(&request).await
}
