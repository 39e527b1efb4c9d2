//! Symbol Source Fetcher.

use async_trait::async_trait;
use linecomp_core::{SymbolImplementationLocation, SymbolSource, slice_range};
use linecomp_parse::{ParseError, PythonParser};

use crate::index::IndexError;

/// Verbatim text for resolved definition sites. One failure fails the batch.
#[async_trait]
pub trait SymbolSourceFetcher: Send + Sync {
    async fn fetch_sources(
        &self,
        locations: &[SymbolImplementationLocation],
    ) -> Result<Vec<SymbolSource>, IndexError>;
}

/// Batch fetch with failures logged and folded into `None`.
pub async fn fetch_symbol_sources(
    fetcher: &dyn SymbolSourceFetcher,
    locations: &[SymbolImplementationLocation],
) -> Option<Vec<SymbolSource>> {
    if locations.is_empty() {
        return Some(Vec::new());
    }
    match fetcher.fetch_sources(locations).await {
        Ok(sources) => Some(sources),
        Err(err) => {
            tracing::warn!(count = locations.len(), error = %err, "symbol source fetch failed");
            None
        }
    }
}

/// Text of one location, widened to the innermost enclosing class when the
/// location asks for it and such a class exists.
pub fn extract_symbol_source(
    parser: &mut PythonParser,
    text: &str,
    location: &SymbolImplementationLocation,
) -> Result<SymbolSource, ParseError> {
    let mut range = location.range();
    if location.expand_to_class
        && let Some(class) = parser.enclosing_class(text, range)?
    {
        range = class.range;
    }

    Ok(SymbolSource {
        name: location.name.clone(),
        path: location.path.clone(),
        start_line: range.start.line,
        start_col: range.start.column,
        text: slice_range(
            text,
            range.start.line,
            range.start.column,
            range.end.line,
            range.end.column,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
class Cart:
    def total(self):
        return sum(self.items)

def checkout(cart):
    return cart.total()
";

    fn location(start: (usize, usize), end: (usize, usize), expand: bool) -> SymbolImplementationLocation {
        SymbolImplementationLocation {
            name: "total".to_owned(),
            path: "shop.py".to_owned(),
            start_line: start.0,
            start_col: start.1,
            end_line: end.0,
            end_col: end.1,
            expand_to_class: expand,
        }
    }

    #[test]
    fn extracts_exact_range() {
        let mut parser = PythonParser::new().expect("parser");
        let source = extract_symbol_source(&mut parser, SOURCE, &location((1, 4), (2, 30), false))
            .expect("extract");
        assert_eq!(source.start_line, 1);
        assert_eq!(source.start_col, 4);
        assert_eq!(source.text, "def total(self):\n        return sum(self.items)");
    }

    #[test]
    fn expands_method_to_class() {
        let mut parser = PythonParser::new().expect("parser");
        let source = extract_symbol_source(&mut parser, SOURCE, &location((1, 4), (2, 30), true))
            .expect("extract");
        assert_eq!((source.start_line, source.start_col), (0, 0));
        assert!(source.text.starts_with("class Cart:\n    def total"));
        assert!(!source.text.contains("checkout"));
    }

    #[test]
    fn expansion_without_class_keeps_range() {
        let mut parser = PythonParser::new().expect("parser");
        let mut top_level = location((4, 0), (5, 23), true);
        top_level.name = "checkout".to_owned();
        let source = extract_symbol_source(&mut parser, SOURCE, &top_level).expect("extract");
        assert_eq!(source.start_line, 4);
        assert_eq!(source.text, "def checkout(cart):\n    return cart.total()");
    }
}
