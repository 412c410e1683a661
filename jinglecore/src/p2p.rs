//! Candidate elements of the Google p2p transport.
//!
//! ```xml
//! <candidate name="rtp" address="10.0.0.2" port="4000" preference="1"
//!            username="..." protocol="udp" generation="0" password="..."
//!            type="local" network="eth0"/>
//! ```
//!
//! In the legacy dialect candidates live in the session namespace directly
//! under the action element; in the standardized dialect they are children of
//! `<transport xmlns="http://www.google.com/transport/p2p">`.

use jingle_xml::{Node, NodeBuilder};

use crate::constants::*;
use crate::error::ParseError;
use crate::parsers::TransportParser;
use crate::types::{Candidate, SignalingProtocol};

const SUPPORTED_PROTOCOLS: [&str; 3] = ["udp", "tcp", "ssltcp"];

#[derive(Debug, Clone, Copy, Default)]
pub struct P2pTransportParser;

impl P2pTransportParser {
    pub fn new() -> Self {
        Self
    }
}

fn parse_candidate(elem: &Node) -> Result<Candidate, ParseError> {
    let mut attrs = elem.attrs();
    let name = attrs.string(ATTR_NAME);
    let address = attrs.string(ATTR_ADDRESS);
    let port = attrs.u16(ATTR_PORT);
    let protocol = attrs.optional_string(ATTR_PROTOCOL).unwrap_or("udp");
    let preference = attrs.optional_f32(ATTR_PREFERENCE).unwrap_or_default();
    let generation = attrs.optional_u32(ATTR_GENERATION).unwrap_or_default();
    let username = attrs.optional_string(ATTR_USERNAME).unwrap_or_default();
    let password = attrs.optional_string(ATTR_PASSWORD).unwrap_or_default();
    let candidate_type = attrs.optional_string(ATTR_CANDIDATE_TYPE).unwrap_or_default();
    let network_name = attrs.optional_string(ATTR_NETWORK).unwrap_or_default();
    attrs.finish()?;

    if !SUPPORTED_PROTOCOLS.contains(&protocol) {
        return Err(ParseError::Invalid {
            field: "candidate protocol",
            reason: protocol.to_string(),
        });
    }

    Ok(Candidate {
        name: name.to_string(),
        address: address.to_string(),
        port,
        protocol: protocol.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        preference,
        candidate_type: candidate_type.to_string(),
        network_name: network_name.to_string(),
        generation,
    })
}

fn write_candidate(candidate: &Candidate, ns: &str) -> Node {
    NodeBuilder::new(LN_CANDIDATE)
        .ns(ns)
        .attr(ATTR_NAME, candidate.name.as_str())
        .attr(ATTR_ADDRESS, candidate.address.as_str())
        .attr(ATTR_PORT, candidate.port.to_string())
        .attr(ATTR_PREFERENCE, candidate.preference.to_string())
        .attr(ATTR_USERNAME, candidate.username.as_str())
        .attr(ATTR_PROTOCOL, candidate.protocol.as_str())
        .attr(ATTR_GENERATION, candidate.generation.to_string())
        .attr(ATTR_PASSWORD, candidate.password.as_str())
        .attr(ATTR_CANDIDATE_TYPE, candidate.candidate_type.as_str())
        .attr(ATTR_NETWORK, candidate.network_name.as_str())
        .build()
}

impl TransportParser for P2pTransportParser {
    fn parse_candidates(&self, elem: &Node) -> Result<Vec<Candidate>, ParseError> {
        elem.get_children_by_tag(LN_CANDIDATE)
            .map(parse_candidate)
            .collect()
    }

    fn write_candidates(&self, candidates: &[Candidate], protocol: SignalingProtocol) -> Vec<Node> {
        let ns = if protocol.is_legacy() {
            NS_GINGLE
        } else {
            NS_GINGLE_P2P
        };
        candidates.iter().map(|c| write_candidate(c, ns)).collect()
    }
}
