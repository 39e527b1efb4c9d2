use linecomp_core::{Position, SourceRange};
use tree_sitter::{Node, Point};

/// Maps tree-sitter byte columns to character columns.
#[derive(Debug, Clone)]
pub struct LineIndex<'s> {
    source: &'s str,
    line_starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    pub fn new(source: &'s str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, byte)| *byte == b'\n')
                .map(|(index, _)| index + 1),
        );
        Self {
            source,
            line_starts,
        }
    }

    pub fn position(&self, point: Point) -> Position {
        let Some(&start) = self.line_starts.get(point.row) else {
            return Position::new(point.row, point.column);
        };
        let end = (start + point.column).min(self.source.len());
        let column = self
            .source
            .get(start..end)
            .map(|prefix| prefix.chars().count())
            .unwrap_or(point.column);
        Position::new(point.row, column)
    }

    pub fn range(&self, node: Node<'_>) -> SourceRange {
        SourceRange::new(
            self.position(node.start_position()),
            self.position(node.end_position()),
        )
    }

    /// Byte point for a character position, clamped to the line end.
    pub fn point(&self, position: Position) -> Point {
        let Some(&start) = self.line_starts.get(position.line) else {
            return Point::new(position.line, position.column);
        };
        let line_end = self
            .line_starts
            .get(position.line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.source.len());
        let line = self.source.get(start..line_end).unwrap_or_default();
        let column = line
            .char_indices()
            .nth(position.column)
            .map(|(index, _)| index)
            .unwrap_or(line.len());
        Point::new(position.line, column)
    }
}
