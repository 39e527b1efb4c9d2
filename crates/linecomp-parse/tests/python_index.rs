use linecomp_core::{Position, ScopeKind, SymbolReference};
use linecomp_parse::{PythonParser, is_builtin_name};

const FIXTURE: &str = include_str!("fixtures/inventory.py");

fn parser() -> PythonParser {
    PythonParser::new().expect("python parser")
}

#[test]
fn decorated_class_scope_starts_at_decorator() {
    let forest = parser().scope_forest(FIXTURE).expect("scope forest");

    let top = forest
        .iter()
        .map(|node| (node.name.as_str(), node.kind))
        .collect::<Vec<_>>();
    assert_eq!(
        top,
        vec![
            ("Item", ScopeKind::Class),
            ("Inventory", ScopeKind::Class),
            ("summarize", ScopeKind::Function),
            ("format_report", ScopeKind::Function),
        ]
    );

    let item = &forest[0];
    assert_eq!(item.range.start, Position::new(3, 0));
    assert_eq!(item.selection_range.start, Position::new(4, 6));
    assert_eq!(item.children.len(), 1);
    assert_eq!(item.children[0].name, "needs_reorder");
    assert_eq!(item.children[0].kind, ScopeKind::Method);

    let inventory_methods = forest[1]
        .children
        .iter()
        .map(|node| node.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(inventory_methods, vec!["__init__", "low_stock", "restock"]);
}

#[test]
fn every_child_range_lies_within_its_parent() {
    fn check(node: &linecomp_core::ScopeNode) {
        for child in &node.children {
            assert!(
                node.range.contains_range(&child.range),
                "{} escapes {}",
                child.name,
                node.name
            );
            check(child);
        }
    }

    for root in parser().scope_forest(FIXTURE).expect("scope forest") {
        check(&root);
    }
}

#[test]
fn call_references_in_summarize_body() {
    let refs = parser().call_references(FIXTURE, 27, 30).expect("refs");
    assert_eq!(
        refs,
        vec![
            SymbolReference::new("low_stock", 28, 20),
            SymbolReference::new("format_report", 29, 11),
        ]
    );
}

#[test]
fn builtin_calls_are_reported_but_recognisable() {
    let refs = parser().call_references(FIXTURE, 13, 25).expect("refs");
    let names = refs.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["list", "needs_reorder", "KeyError"]);

    let project = names
        .into_iter()
        .filter(|name| !is_builtin_name(name))
        .collect::<Vec<_>>();
    assert_eq!(project, vec!["needs_reorder"]);
}
