//! Completion Request Builder.

use linecomp_core::protocol::SuggestRequest;
use linecomp_core::{ContextInstance, ContextItem, SymbolSource};

/// Assembles the suggest payload. The main text item, when set, travels as
/// `primary_context`; the remaining non-ignored items follow in list order.
pub fn build_suggest_request(
    close_context: String,
    symbol_implementations: Vec<SymbolSource>,
    instance: Option<&ContextInstance>,
) -> SuggestRequest {
    let Some(instance) = instance else {
        return SuggestRequest {
            close_context,
            symbol_implementations,
            ..SuggestRequest::default()
        };
    };

    SuggestRequest {
        close_context,
        symbol_implementations,
        primary_context: instance.main_text().map(ContextItem::text),
        user_context: instance.supplementary_items().cloned().collect(),
        web_search_enabled: instance.web_search_enabled,
    }
}
