use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

pub mod protocol;
mod secret;
pub mod text;

pub use secret::Secret;
pub use text::{COMMENT_MARKER, is_semantically_empty, slice_lines, slice_range, splice_marker};

/// Separator placed between rendered context sections.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Zero-based line/column pair. Columns count characters, not bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Half-open range: `start` is inside, `end` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: Position,
    pub end: Position,
}

impl SourceRange {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position < self.end
    }

    pub fn contains_range(&self, other: &SourceRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// First line after the range. A range ending at column 0 does not
    /// cover its end line.
    pub fn end_line_exclusive(&self) -> usize {
        let end = if self.end.column == 0 {
            self.end.line
        } else {
            self.end.line + 1
        };
        end.max(self.start.line + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Function,
    Method,
    Class,
    Other,
}

impl ScopeKind {
    pub fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }
}

/// One lexical scope of a source file. Children are always contained in
/// the parent's range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeNode {
    pub name: String,
    pub kind: ScopeKind,
    pub range: SourceRange,
    pub selection_range: SourceRange,
    #[serde(default)]
    pub children: Vec<ScopeNode>,
}

/// A call/use site found inside the near-cursor window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolReference {
    pub name: String,
    pub line: usize,
    pub column: usize,
}

impl SymbolReference {
    pub fn new(name: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            name: name.into(),
            line,
            column,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

/// A definition site returned by go-to-implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationCandidate {
    pub path: String,
    pub range: SourceRange,
}

/// Resolved definition of one reference, handed to the source fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolImplementationLocation {
    pub name: String,
    pub path: String,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    /// Exclusive.
    pub end_col: usize,
    #[serde(default)]
    pub expand_to_class: bool,
}

impl SymbolImplementationLocation {
    pub fn from_candidate(
        name: impl Into<String>,
        candidate: &ImplementationCandidate,
        expand_to_class: bool,
    ) -> Self {
        Self {
            name: name.into(),
            path: candidate.path.clone(),
            start_line: candidate.range.start.line,
            start_col: candidate.range.start.column,
            end_line: candidate.range.end.line,
            end_col: candidate.range.end.column,
            expand_to_class,
        }
    }

    pub fn range(&self) -> SourceRange {
        SourceRange::new(
            Position::new(self.start_line, self.start_col),
            Position::new(self.end_line, self.end_col),
        )
    }

    /// Identity of the resolved definition, independent of the reference name.
    pub fn location_key(&self) -> (&str, usize, usize, usize, usize) {
        (
            self.path.as_str(),
            self.start_line,
            self.start_col,
            self.end_line,
            self.end_col,
        )
    }
}

/// Verbatim source text of one resolved symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolSource {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    pub start_line: usize,
    pub start_col: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextItem {
    File {
        path: String,
    },
    Url {
        address: String,
    },
    Text {
        body: String,
        #[serde(default)]
        ignored: bool,
    },
}

impl ContextItem {
    pub fn file(path: impl Into<String>) -> Self {
        Self::File { path: path.into() }
    }

    pub fn url(address: impl Into<String>) -> Self {
        Self::Url {
            address: address.into(),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::Text {
            body: body.into(),
            ignored: false,
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Text { ignored: true, .. })
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::Url { .. } => "url",
            Self::Text { .. } => "text",
        }
    }
}

/// A named, user-curated bundle of context items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInstance {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<ContextItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_item: Option<usize>,
    #[serde(default)]
    pub web_search_enabled: bool,
}

impl ContextInstance {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            items: Vec::new(),
            main_item: None,
            web_search_enabled: false,
        }
    }

    /// The designated main item, when it is a non-ignored text item.
    pub fn main_text(&self) -> Option<&str> {
        let index = self.main_item?;
        match self.items.get(index)? {
            ContextItem::Text {
                body,
                ignored: false,
            } => Some(body.as_str()),
            _ => None,
        }
    }

    /// Non-ignored items other than the main item, in list order.
    pub fn supplementary_items(&self) -> impl Iterator<Item = &ContextItem> {
        let main = self.main_text().and(self.main_item);
        self.items
            .iter()
            .enumerate()
            .filter(move |(index, item)| Some(*index) != main && !item.is_ignored())
            .map(|(_, item)| item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SectionTag {
    Task,
    Context,
    File,
    Url,
    Symbol,
}

impl SectionTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "TASK",
            Self::Context => "CONTEXT",
            Self::File => "FILE",
            Self::Url => "URL",
            Self::Symbol => "SYMBOL",
        }
    }
}

impl fmt::Display for SectionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rendered unit of a compiled context document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSection {
    pub tag: SectionTag,
    pub title: String,
    pub body: String,
    pub language: Option<String>,
}

impl ContextSection {
    pub fn new(tag: SectionTag, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            tag,
            title: title.into(),
            body: body.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language = language.map(str::to_owned);
        self
    }

    pub fn begin_delimiter(&self) -> String {
        format!("<<<BEGIN {}: {}>>>", self.tag, self.title)
    }

    pub fn end_delimiter(&self) -> String {
        format!("<<<END {}: {}>>>", self.tag, self.title)
    }

    pub fn render(&self) -> String {
        let body = self.body.trim_end_matches('\n');
        match self.language.as_deref() {
            Some(language) => format!(
                "{}\n```{language}\n{body}\n```\n{}",
                self.begin_delimiter(),
                self.end_delimiter()
            ),
            None => format!(
                "{}\n{body}\n{}",
                self.begin_delimiter(),
                self.end_delimiter()
            ),
        }
    }
}

/// Joins rendered sections into one document.
pub fn render_sections(sections: &[ContextSection]) -> String {
    sections
        .iter()
        .map(ContextSection::render)
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

/// Fence language for a file path, by extension.
pub fn fence_language_for_path(path: &str) -> Option<&'static str> {
    let extension = std::path::Path::new(path)
        .extension()?
        .to_string_lossy()
        .to_ascii_lowercase();
    match extension.as_str() {
        "py" => Some("python"),
        _ => None,
    }
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// True when `path` stays under the directory it is joined onto: no root,
/// no drive prefix and no `..` component.
pub fn is_workspace_relative(path: &str) -> bool {
    let normalized = normalize_path(path);
    let mut components = Path::new(&normalized).components().peekable();
    if let Some(Component::Normal(first)) = components.peek()
        && first.to_string_lossy().contains(':')
    {
        return false;
    }
    components.all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
