pub mod attrs;
pub mod builder;
pub mod error;
pub mod node;
pub mod xml;

pub use attrs::AttrParser;
pub use builder::NodeBuilder;
pub use error::{Result, XmlError};
pub use node::{Attrs, Node, NodeContent};
pub use xml::DisplayableNode;
