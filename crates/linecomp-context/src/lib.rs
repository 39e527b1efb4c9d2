//! Context assembly for line completions: from a cursor position to a
//! suggest request, plus the "copy context" document.

pub mod backend;
pub mod compiler;
pub mod index;
pub mod pipeline;
pub mod request;
pub mod resolver;
pub mod scope;
pub mod service;
pub mod source;
pub mod state;
pub mod trigger;

pub use backend::{BackendClient, BackendError};
pub use compiler::{CompileRequest, ContextCompiler};
pub use index::{IndexError, LocalSymbolIndex, ReferenceFinder, SymbolIndex};
pub use pipeline::{
    AbortReason, CompletionOutcome, CompletionPipeline, DocumentCursor, NO_SUGGESTION_NOTICE,
    copy_context,
};
pub use request::build_suggest_request;
pub use resolver::ImplementationResolver;
pub use scope::{NearCursorWindow, WindowOptions, find_anchor_line, find_enclosing_scope, near_cursor_window};
pub use service::{CompletionService, InProcessCompletionService, ServiceError};
pub use source::{SymbolSourceFetcher, extract_symbol_source, fetch_symbol_sources};
pub use state::{ExtensionState, ModelConfig, Settings, StateError, StateStore};
pub use trigger::{TriggerIntent, TriggerQueue};
