use crate::attrs::AttrParser;
use indexmap::IndexMap;

/// Attributes in insertion order. Namespaces are not attributes; see [`Node::ns`].
pub type Attrs = IndexMap<String, String>;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Text(String),
    Nodes(Vec<Node>),
}

/// A namespace-qualified element.
///
/// `tag` is the local name and `ns` the namespace URI; an empty `ns` means the
/// element is unqualified.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub tag: String,
    pub ns: String,
    pub attrs: Attrs,
    pub content: Option<NodeContent>,
}

impl Node {
    pub fn new(tag: &str, ns: &str, attrs: Attrs, content: Option<NodeContent>) -> Self {
        Self {
            tag: tag.to_string(),
            ns: ns.to_string(),
            attrs,
            content,
        }
    }

    /// True if this element has the given namespace and local name.
    pub fn is(&self, ns: &str, tag: &str) -> bool {
        self.ns == ns && self.tag == tag
    }

    pub fn children(&self) -> Option<&[Node]> {
        match &self.content {
            Some(NodeContent::Nodes(nodes)) => Some(nodes),
            _ => None,
        }
    }

    pub fn child_nodes(&self) -> impl Iterator<Item = &Node> {
        self.children().into_iter().flatten()
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.children().and_then(|nodes| nodes.first())
    }

    pub fn has_children(&self) -> bool {
        self.children().is_some_and(|nodes| !nodes.is_empty())
    }

    pub fn attrs(&self) -> AttrParser<'_> {
        AttrParser::new(self)
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Text body, or `None` when the element holds children or nothing.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            Some(NodeContent::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// First child with this local name, in any namespace.
    pub fn get_optional_child(&self, tag: &str) -> Option<&Node> {
        self.child_nodes().find(|node| node.tag == tag)
    }

    /// First child with this exact namespace and local name.
    pub fn get_child(&self, ns: &str, tag: &str) -> Option<&Node> {
        self.child_nodes().find(|node| node.is(ns, tag))
    }

    pub fn get_children_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> {
        self.child_nodes().filter(move |c| c.tag == tag)
    }

    pub fn add_child(&mut self, child: Node) {
        match &mut self.content {
            Some(NodeContent::Nodes(nodes)) => nodes.push(child),
            _ => self.content = Some(NodeContent::Nodes(vec![child])),
        }
    }

    pub fn add_children(&mut self, children: impl IntoIterator<Item = Node>) {
        for child in children {
            self.add_child(child);
        }
    }
}
