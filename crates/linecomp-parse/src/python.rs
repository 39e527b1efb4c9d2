use std::path::Path;

use linecomp_core::{Position, ScopeKind, ScopeNode, SourceRange, SymbolReference};
use streaming_iterator::StreamingIterator;
use thiserror::Error;
use tree_sitter::{Node, Parser, Query, QueryCursor, Tree};

use crate::captures::{QueryCaptures, node_text};
use crate::lines::LineIndex;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to load python tree-sitter grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),
    #[error("tree-sitter parser produced no syntax tree")]
    NoTree,
}

/// A `def` or `class` found in a file, flattened out of the scope forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub kind: ScopeKind,
    pub range: SourceRange,
    pub selection_range: SourceRange,
}

pub struct PythonParser {
    parser: Parser,
    call_query: Query,
    scope_query: Query,
}

impl PythonParser {
    pub fn new() -> Result<Self, ParseError> {
        let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
        let mut parser = Parser::new();
        parser.set_language(&language)?;

        let call_query = Query::new(&language, include_str!("../queries/python_calls.scm"))
            .expect("invalid python call query");
        let scope_query = Query::new(&language, include_str!("../queries/python_scopes.scm"))
            .expect("invalid python scope query");

        Ok(Self {
            parser,
            call_query,
            scope_query,
        })
    }

    fn parse(&mut self, source: &str) -> Result<Tree, ParseError> {
        self.parser.parse(source, None).ok_or(ParseError::NoTree)
    }

    /// Top-level `def`/`class` scopes with their nested scopes as children.
    pub fn scope_forest(&mut self, source: &str) -> Result<Vec<ScopeNode>, ParseError> {
        let definitions = self.definitions(source)?;
        Ok(nest_definitions(definitions))
    }

    /// Every `def`/`class` in source order.
    pub fn definitions(&mut self, source: &str) -> Result<Vec<Definition>, ParseError> {
        let tree = self.parse(source)?;
        let lines = LineIndex::new(source);
        let mut cursor = QueryCursor::new();
        let mut definitions = Vec::new();

        let mut query_matches = cursor.matches(&self.scope_query, tree.root_node(), source.as_bytes());
        while let Some(matched) = query_matches.next() {
            let captures = QueryCaptures::new(&self.scope_query, matched.captures);
            let Some((tag, node)) = captures.tagged_node("scope.") else {
                continue;
            };
            let Some(name_node) = captures.node("name") else {
                continue;
            };

            let kind = match tag {
                "scope.class" => ScopeKind::Class,
                _ if is_method_definition(node) => ScopeKind::Method,
                _ => ScopeKind::Function,
            };
            let outer = decorated_parent(node).unwrap_or(node);

            definitions.push(Definition {
                name: node_text(name_node, source).to_owned(),
                kind,
                range: lines.range(outer),
                selection_range: lines.range(name_node),
            });
        }

        definitions.sort_by_key(|definition| definition.range.start);
        Ok(definitions)
    }

    /// Callee name tokens of `f(...)` and `obj.f(...)` whose line lies in
    /// `[start_line, end_line)`, ordered by position.
    pub fn call_references(
        &mut self,
        source: &str,
        start_line: usize,
        end_line: usize,
    ) -> Result<Vec<SymbolReference>, ParseError> {
        if start_line >= end_line {
            return Ok(Vec::new());
        }

        let tree = self.parse(source)?;
        let lines = LineIndex::new(source);
        let mut cursor = QueryCursor::new();
        cursor.set_point_range(
            lines.point(Position::new(start_line, 0))..lines.point(Position::new(end_line, 0)),
        );

        let mut references = Vec::new();
        let mut query_matches = cursor.matches(&self.call_query, tree.root_node(), source.as_bytes());
        while let Some(matched) = query_matches.next() {
            let captures = QueryCaptures::new(&self.call_query, matched.captures);
            let Some(node) = captures.node("reference.name") else {
                continue;
            };
            let start = lines.position(node.start_position());
            if start.line < start_line || start.line >= end_line {
                continue;
            }
            references.push(SymbolReference::new(
                node_text(node, source),
                start.line,
                start.column,
            ));
        }

        references.sort_by_key(SymbolReference::position);
        references.dedup();
        Ok(references)
    }

    /// Innermost class whose range covers `range`.
    pub fn enclosing_class(
        &mut self,
        source: &str,
        range: SourceRange,
    ) -> Result<Option<Definition>, ParseError> {
        Ok(self
            .definitions(source)?
            .into_iter()
            .filter(|definition| {
                definition.kind == ScopeKind::Class && definition.range.contains_range(&range)
            })
            .max_by_key(|definition| definition.range.start))
    }
}

fn is_method_definition(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(parent) = current {
        match parent.kind() {
            "class_definition" => return true,
            "function_definition" | "lambda" => return false,
            _ => current = parent.parent(),
        }
    }
    false
}

fn decorated_parent(node: Node<'_>) -> Option<Node<'_>> {
    node.parent()
        .filter(|parent| parent.kind() == "decorated_definition")
}

/// Builds the forest from definitions sorted by start position.
fn nest_definitions(definitions: Vec<Definition>) -> Vec<ScopeNode> {
    let mut roots: Vec<ScopeNode> = Vec::new();
    let mut stack: Vec<ScopeNode> = Vec::new();

    for definition in definitions {
        let node = ScopeNode {
            name: definition.name,
            kind: definition.kind,
            range: definition.range,
            selection_range: definition.selection_range,
            children: Vec::new(),
        };

        while let Some(top) = stack.last() {
            if top.range.contains_range(&node.range) {
                break;
            }
            let Some(finished) = stack.pop() else { break };
            attach(&mut stack, &mut roots, finished);
        }
        stack.push(node);
    }

    while let Some(finished) = stack.pop() {
        attach(&mut stack, &mut roots, finished);
    }
    roots
}

fn attach(stack: &mut [ScopeNode], roots: &mut Vec<ScopeNode>, node: ScopeNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => roots.push(node),
    }
}

pub fn is_python_path(path: &Path) -> bool {
    path.extension()
        .map(|extension| extension.eq_ignore_ascii_case("py") || extension.eq_ignore_ascii_case("pyi"))
        .unwrap_or(false)
}

const PYTHON_BUILTINS: &[&str] = &[
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint", "bytearray",
    "bytes", "callable", "chr", "classmethod", "compile", "complex", "delattr", "dict", "dir",
    "divmod", "enumerate", "eval", "exec", "filter", "float", "format", "frozenset", "getattr",
    "globals", "hasattr", "hash", "help", "hex", "id", "input", "int", "isinstance",
    "issubclass", "iter", "len", "list", "locals", "map", "max", "memoryview", "min", "next",
    "object", "oct", "open", "ord", "pow", "print", "property", "range", "repr", "reversed",
    "round", "set", "setattr", "slice", "sorted", "staticmethod", "str", "sum", "super",
    "tuple", "type", "vars", "zip", "__import__", "BaseException", "Exception",
    "ArithmeticError", "AssertionError", "AttributeError", "KeyError", "IndexError",
    "LookupError", "NotImplementedError", "OSError", "RuntimeError", "StopIteration",
    "TypeError", "ValueError",
];

/// Names bound by the interpreter itself; these never resolve to project code.
pub fn is_builtin_name(name: &str) -> bool {
    PYTHON_BUILTINS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> PythonParser {
        PythonParser::new().expect("python parser")
    }

    const SOURCE: &str = "\
import os

class Processor:
    def process(self, data):
        def helper(x):
            return x
        return helper(data)

    @staticmethod
    def build():
        return Processor()

def main():
    p = Processor()
    print(p.process(os.getcwd()))
";

    #[test]
    fn scope_forest_nests_methods_and_inner_functions() {
        let forest = parser().scope_forest(SOURCE).expect("forest");
        let names = forest.iter().map(|node| node.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Processor", "main"]);

        let class = &forest[0];
        assert_eq!(class.kind, ScopeKind::Class);
        assert_eq!(class.range.start, Position::new(2, 0));
        let methods = class
            .children
            .iter()
            .map(|node| (node.name.as_str(), node.kind))
            .collect::<Vec<_>>();
        assert_eq!(
            methods,
            vec![("process", ScopeKind::Method), ("build", ScopeKind::Method)]
        );

        let helper = &class.children[0].children[0];
        assert_eq!(helper.name, "helper");
        assert_eq!(helper.kind, ScopeKind::Function);
        assert_eq!(helper.selection_range.start, Position::new(4, 12));

        // decorator belongs to the method's range
        assert_eq!(class.children[1].range.start, Position::new(8, 4));
        assert_eq!(forest[1].kind, ScopeKind::Function);
    }

    #[test]
    fn call_references_are_limited_to_line_window() {
        let mut parser = parser();
        let refs = parser.call_references(SOURCE, 13, 15).expect("refs");
        let names = refs.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Processor", "print", "process", "getcwd"]);
        assert_eq!(refs[0], SymbolReference::new("Processor", 13, 8));

        let none = parser.call_references(SOURCE, 0, 2).expect("refs");
        assert!(none.is_empty());
        assert!(parser.call_references(SOURCE, 5, 5).expect("refs").is_empty());
    }

    #[test]
    fn enclosing_class_covers_method_range() {
        let mut parser = parser();
        let method = parser
            .definitions(SOURCE)
            .expect("defs")
            .into_iter()
            .find(|definition| definition.name == "process")
            .expect("process");

        let class = parser
            .enclosing_class(SOURCE, method.range)
            .expect("parse")
            .expect("class");
        assert_eq!(class.name, "Processor");

        let main = SourceRange::new(Position::new(12, 0), Position::new(14, 0));
        assert!(parser.enclosing_class(SOURCE, main).expect("parse").is_none());
    }

    #[test]
    fn builtins_and_paths() {
        assert!(is_builtin_name("print"));
        assert!(!is_builtin_name("process"));
        assert!(is_python_path(Path::new("pkg/mod.py")));
        assert!(is_python_path(Path::new("stubs/mod.PYI")));
        assert!(!is_python_path(Path::new("main.rs")));
    }
}
