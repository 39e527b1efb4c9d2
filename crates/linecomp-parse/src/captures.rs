use tree_sitter::{Node, Query, QueryCapture};

/// Name-based access to the captures of one query match.
pub(crate) struct QueryCaptures<'q, 'tree> {
    query: &'q Query,
    captures: &'q [QueryCapture<'tree>],
}

impl<'q, 'tree> QueryCaptures<'q, 'tree> {
    pub(crate) fn new(query: &'q Query, captures: &'q [QueryCapture<'tree>]) -> Self {
        Self { query, captures }
    }

    pub(crate) fn node(&self, name: &str) -> Option<Node<'tree>> {
        self.captures.iter().find_map(|capture| {
            (self.capture_name(capture.index)? == name).then_some(capture.node)
        })
    }

    /// The first capture whose name starts with `prefix`, with its name.
    pub(crate) fn tagged_node(&self, prefix: &str) -> Option<(&'q str, Node<'tree>)> {
        self.captures.iter().find_map(|capture| {
            let name = self.capture_name(capture.index)?;
            name.starts_with(prefix).then_some((name, capture.node))
        })
    }

    fn capture_name(&self, index: u32) -> Option<&'q str> {
        self.query.capture_names().get(index as usize).copied()
    }
}

pub(crate) fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or_default()
}
