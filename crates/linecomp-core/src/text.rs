//! Line-oriented text helpers shared by the pipeline and the backend.

/// Line-comment leader of the supported source language.
pub const COMMENT_MARKER: char = '#';

/// True for blank lines and lines holding only a comment.
pub fn is_semantically_empty(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER)
}

/// Inserts `marker` at (`line`, `column`), padding with blank lines and
/// spaces when the target lies beyond the text. Columns count characters.
pub fn splice_marker(text: &str, line: usize, column: usize, marker: &str) -> String {
    let mut lines = text.split('\n').map(str::to_owned).collect::<Vec<_>>();
    while lines.len() <= line {
        lines.push(String::new());
    }

    let target = &mut lines[line];
    let length = target.chars().count();
    if column > length {
        target.extend(std::iter::repeat_n(' ', column - length));
    }
    let offset = target
        .char_indices()
        .nth(column)
        .map(|(index, _)| index)
        .unwrap_or(target.len());
    target.insert_str(offset, marker);

    lines.join("\n")
}

/// Lines `[start, end)` joined with `\n`. Out-of-range lines are skipped.
pub fn slice_lines(text: &str, start: usize, end: usize) -> String {
    if end <= start {
        return String::new();
    }
    text.split('\n')
        .skip(start)
        .take(end - start)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text between two (line, column) positions, end exclusive. Positions past
/// the end of a line or of the text are clamped.
pub fn slice_range(
    text: &str,
    start_line: usize,
    start_col: usize,
    end_line: usize,
    end_col: usize,
) -> String {
    let lines = text.split('\n').collect::<Vec<_>>();
    if lines.is_empty() || start_line >= lines.len() || (start_line, start_col) >= (end_line, end_col)
    {
        return String::new();
    }

    let (end_line, end_col) = if end_line >= lines.len() {
        let last = lines.len() - 1;
        (last, lines[last].chars().count())
    } else {
        (end_line, end_col)
    };

    let mut out = String::new();
    for (index, line) in lines
        .iter()
        .enumerate()
        .take(end_line + 1)
        .skip(start_line)
    {
        let from = if index == start_line { start_col } else { 0 };
        let to = if index == end_line {
            end_col
        } else {
            usize::MAX
        };
        out.extend(line.chars().skip(from).take(to.saturating_sub(from)));
        if index != end_line {
            out.push('\n');
        }
    }
    out
}
