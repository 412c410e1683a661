use std::collections::HashMap;
use std::sync::Arc;

use jingle_xml::Node;

use crate::error::{ParseError, WriteError};
use crate::types::{Candidate, ContentDescription, SignalingProtocol};

/// Reads and writes the `description` element of one content type.
///
/// Registered in a [`ContentParserMap`] under the namespace of the element it
/// handles. One parser may serve several namespaces.
pub trait ContentParser: Send + Sync {
    /// `protocol` is the dialect the peer is speaking, for descriptions whose
    /// meaning differs between the two.
    fn parse_content(
        &self,
        elem: &Node,
        protocol: SignalingProtocol,
    ) -> Result<Arc<dyn ContentDescription>, ParseError>;

    fn write_content(
        &self,
        content_type: &str,
        description: &dyn ContentDescription,
    ) -> Result<Node, WriteError>;
}

/// Reads and writes candidate elements for one transport namespace.
pub trait TransportParser: Send + Sync {
    /// Parses every candidate child of `elem`.
    fn parse_candidates(&self, elem: &Node) -> Result<Vec<Candidate>, ParseError>;

    fn write_candidates(&self, candidates: &[Candidate], protocol: SignalingProtocol) -> Vec<Node>;
}

pub type ContentParserMap = HashMap<String, Arc<dyn ContentParser>>;
pub type TransportParserMap = HashMap<String, Arc<dyn TransportParser>>;
