//! Enclosing-scope resolution and the near-cursor window.

use linecomp_core::{Position, ScopeNode, is_semantically_empty, slice_lines, splice_marker};

/// Innermost function or method whose range contains `position`.
///
/// Children are searched before their parent, so a nested function wins over
/// the function or class around it. Among overlapping siblings the first one
/// in traversal order wins.
pub fn find_enclosing_scope(forest: &[ScopeNode], position: Position) -> Option<&ScopeNode> {
    forest
        .iter()
        .filter(|node| node.range.contains(position))
        .find_map(|node| {
            find_enclosing_scope(&node.children, position)
                .or_else(|| node.kind.is_callable().then_some(node))
        })
}

/// Nearest meaningful line at or above `cursor_line`, looking back at most
/// `lookback` lines. When every examined line is empty the last examined line
/// is returned.
pub fn find_anchor_line(text: &str, cursor_line: usize, lookback: usize) -> usize {
    let lines = text.split('\n').collect::<Vec<_>>();
    let mut anchor = cursor_line;
    for _ in 0..lookback {
        let line = lines.get(anchor).copied().unwrap_or_default();
        if anchor == 0 || !is_semantically_empty(line) {
            break;
        }
        anchor -= 1;
    }
    anchor
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOptions {
    pub marker: String,
    pub anchor_lookback_lines: usize,
    pub fallback_radius_lines: usize,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            marker: linecomp_config::DEFAULT_MARKER.to_owned(),
            anchor_lookback_lines: linecomp_config::DEFAULT_ANCHOR_LOOKBACK_LINES,
            fallback_radius_lines: linecomp_config::DEFAULT_FALLBACK_RADIUS_LINES,
        }
    }
}

impl From<&linecomp_config::PipelineConfig> for WindowOptions {
    fn from(config: &linecomp_config::PipelineConfig) -> Self {
        Self {
            marker: config.marker.clone(),
            anchor_lookback_lines: config.anchor_lookback_lines,
            fallback_radius_lines: config.fallback_radius_lines,
        }
    }
}

/// Lines `[start_line, end_line)` around the cursor with the marker spliced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NearCursorWindow {
    pub start_line: usize,
    pub end_line: usize,
    pub anchor_line: usize,
    pub scope_name: Option<String>,
    pub close_context: String,
}

pub fn near_cursor_window(
    text: &str,
    cursor: Position,
    forest: &[ScopeNode],
    options: &WindowOptions,
) -> NearCursorWindow {
    let anchor_line = find_anchor_line(text, cursor.line, options.anchor_lookback_lines);
    let anchor = if anchor_line == cursor.line {
        cursor
    } else {
        let column = text
            .split('\n')
            .nth(anchor_line)
            .map(|line| line.chars().take_while(|ch| ch.is_whitespace()).count())
            .unwrap_or(0);
        Position::new(anchor_line, column)
    };

    let scope = find_enclosing_scope(forest, anchor);
    let (start_line, end_line) = match scope {
        Some(scope) => (
            scope.range.start.line,
            scope.range.end_line_exclusive().max(cursor.line + 1),
        ),
        None => (
            cursor.line.saturating_sub(options.fallback_radius_lines),
            (cursor.line + options.fallback_radius_lines).max(cursor.line + 1),
        ),
    };

    let spliced = splice_marker(text, cursor.line, cursor.column, &options.marker);
    NearCursorWindow {
        start_line,
        end_line,
        anchor_line,
        scope_name: scope.map(|scope| scope.name.clone()),
        close_context: slice_lines(&spliced, start_line, end_line),
    }
}
