use std::fmt;

use crate::node::{Attrs, Node, NodeContent};

/// Single-line XML rendering of a [`Node`], used when logging stanzas.
///
/// `xmlns` is emitted only where an element's namespace differs from its
/// parent's.
pub struct DisplayableNode<'a>(pub &'a Node);

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_attributes(attrs: &Attrs) -> String {
    let mut result = String::new();
    for (key, value) in attrs {
        result.push_str(&format!(" {}=\"{}\"", key, escape(value)));
    }
    result
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &Node, parent_ns: &str) -> fmt::Result {
    let xmlns = if node.ns != parent_ns {
        format!(" xmlns=\"{}\"", escape(&node.ns))
    } else {
        String::new()
    };
    let attrs = format_attributes(&node.attrs);

    match &node.content {
        None => write!(f, "<{}{}{}/>", node.tag, xmlns, attrs),
        Some(NodeContent::Nodes(nodes)) if nodes.is_empty() => {
            write!(f, "<{}{}{}/>", node.tag, xmlns, attrs)
        }
        Some(NodeContent::Nodes(nodes)) => {
            write!(f, "<{}{}{}>", node.tag, xmlns, attrs)?;
            for child in nodes {
                write_node(f, child, &node.ns)?;
            }
            write!(f, "</{}>", node.tag)
        }
        Some(NodeContent::Text(text)) => write!(
            f,
            "<{}{}{}>{}</{}>",
            node.tag,
            xmlns,
            attrs,
            escape(text).replace('\n', "\\n"),
            node.tag
        ),
    }
}

impl<'a> fmt::Display for DisplayableNode<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(f, self.0, "")
    }
}
