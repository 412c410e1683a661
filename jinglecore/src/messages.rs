//! Session message codec.
//!
//! Session messages travel as `iq type="set"` stanzas carrying one `session`
//! element in the Gingle namespace:
//!
//! ```xml
//! <iq to="callee@example.com/res" type="set" id="42">
//!   <session xmlns="http://www.google.com/session"
//!            type="initiate" id="8329411" initiator="caller@example.com/res">
//!     <description xmlns="http://www.google.com/session/phone">...</description>
//!     <transport xmlns="http://www.google.com/transport/p2p"/>
//!   </session>
//! </iq>
//! ```
//!
//! # Dialects
//!
//! The legacy dialect ([`SignalingProtocol::Gingle`]) has no `transport`
//! element: candidates go straight under `session` in a `candidates` action,
//! and only one description element is allowed. The standardized layout wraps
//! candidates in `transport` and exchanges them with `transport-info`.
//! Which dialect a peer speaks is detected per message in
//! [`parse_session_message`].

use jingle_xml::{Node, NodeBuilder};
use log::debug;

use crate::constants::*;
use crate::error::{ParseError, StanzaErrorCondition, WriteError};
use crate::parsers::{ContentParserMap, TransportParserMap};
use crate::types::{
    ActionType, Candidate, ContentInfo, SessionId, SignalingProtocol, content_name_for,
};

/// A parsed session envelope. Borrows the stanza it was read from.
#[derive(Debug, Clone)]
pub struct SessionMessage<'a> {
    /// Stanza id, echoed in the acknowledgement.
    pub id: String,
    pub from: String,
    pub to: String,
    pub protocol: SignalingProtocol,
    pub action: ActionType,
    pub sid: String,
    pub initiator: String,
    /// The `session` element; action payloads are its children.
    pub action_elem: &'a Node,
    pub stanza: &'a Node,
}

impl SessionMessage<'_> {
    pub fn session_id(&self) -> SessionId {
        SessionId::new(self.sid.as_str(), self.initiator.as_str())
    }
}

pub fn is_session_message(stanza: &Node) -> bool {
    stanza.tag == LN_IQ
        && stanza.attr(ATTR_TYPE) == Some(IQ_TYPE_SET)
        && stanza.get_child(NS_GINGLE, LN_SESSION).is_some()
}

/// Reads the session envelope of `stanza` and classifies its dialect.
///
/// A message is legacy if its action is `candidates`, or if it is an initiate
/// without a `transport` child.
pub fn parse_session_message(stanza: &Node) -> Result<SessionMessage<'_>, ParseError> {
    let action_elem = stanza
        .get_child(NS_GINGLE, LN_SESSION)
        .ok_or(ParseError::MissingElement(LN_SESSION))?;

    let mut attrs = action_elem.attrs();
    let type_str = attrs.string(ATTR_TYPE);
    let sid = attrs.string(ATTR_ID);
    let initiator = attrs.string(ATTR_INITIATOR);
    attrs.finish()?;

    let action = ActionType::classify(type_str);
    if action == ActionType::Unknown {
        return Err(ParseError::UnknownAction(type_str.to_string()));
    }

    let legacy = type_str == GINGLE_ACTION_CANDIDATES
        || (action == ActionType::SessionInitiate
            && action_elem.get_optional_child(LN_TRANSPORT).is_none());
    let protocol = if legacy {
        SignalingProtocol::Gingle
    } else {
        SignalingProtocol::Gingle2
    };

    let mut stanza_attrs = stanza.attrs();
    Ok(SessionMessage {
        id: stanza_attrs.optional_string(ATTR_ID).unwrap_or_default().to_string(),
        from: stanza_attrs.optional_string(ATTR_FROM).unwrap_or_default().to_string(),
        to: stanza_attrs.optional_string(ATTR_TO).unwrap_or_default().to_string(),
        protocol,
        action,
        sid: sid.to_string(),
        initiator: initiator.to_string(),
        action_elem,
        stanza,
    })
}

/// Builds an outgoing `iq type="set"` session stanza.
#[derive(Debug, Clone)]
pub struct SessionStanzaBuilder {
    action: ActionType,
    protocol: SignalingProtocol,
    sid: String,
    initiator: String,
    to: String,
    id: Option<String>,
    children: Vec<Node>,
}

impl SessionStanzaBuilder {
    pub fn new(action: ActionType, protocol: SignalingProtocol, session_id: &SessionId) -> Self {
        Self {
            action,
            protocol,
            sid: session_id.id.clone(),
            initiator: session_id.initiator.clone(),
            to: String::new(),
            id: None,
            children: Vec::new(),
        }
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn build(self) -> Node {
        let session = NodeBuilder::new(LN_SESSION)
            .ns(NS_GINGLE)
            .attr(ATTR_TYPE, self.action.render(self.protocol))
            .attr(ATTR_ID, self.sid)
            .attr(ATTR_INITIATOR, self.initiator)
            .children(self.children)
            .build();

        let mut iq = NodeBuilder::new(LN_IQ).attr(ATTR_TO, self.to);
        if let Some(id) = self.id {
            iq = iq.attr(ATTR_ID, id);
        }
        iq.attr(ATTR_TYPE, IQ_TYPE_SET).children([session]).build()
    }
}

/// Acknowledges a session message that was handled successfully.
pub fn build_session_ack(msg: &SessionMessage<'_>) -> Node {
    NodeBuilder::new(LN_IQ)
        .attr(ATTR_TO, msg.from.as_str())
        .attr(ATTR_ID, msg.id.as_str())
        .attr(ATTR_TYPE, IQ_TYPE_RESULT)
        .build()
}

/// Builds an `iq type="error"` reply to `original`, echoing its payload.
pub fn build_error_response(
    original: &Node,
    condition: StanzaErrorCondition,
    error_type: &str,
    text: &str,
) -> Node {
    let mut error_children = vec![NodeBuilder::new(condition.as_str()).ns(NS_STANZA_ERRORS).build()];
    if !text.is_empty() {
        error_children.push(
            NodeBuilder::new(LN_TEXT)
                .ns(NS_STANZA_ERRORS)
                .string_content(text)
                .build(),
        );
    }
    let error = NodeBuilder::new(LN_ERROR)
        .attr(ATTR_TYPE, error_type)
        .children(error_children)
        .build();

    NodeBuilder::new(LN_IQ)
        .attr_if_present(ATTR_TO, original.attr(ATTR_FROM).unwrap_or_default())
        .attr_if_present(ATTR_ID, original.attr(ATTR_ID).unwrap_or_default())
        .attr(ATTR_TYPE, IQ_TYPE_ERROR)
        .children(original.child_nodes().cloned().chain([error]))
        .build()
}

/// Namespace of the first `description` under the action element.
pub fn parse_first_content_type(action_elem: &Node) -> Result<&str, ParseError> {
    action_elem
        .get_optional_child(LN_DESCRIPTION)
        .map(|d| d.ns.as_str())
        .ok_or(ParseError::MissingElement(LN_DESCRIPTION))
}

/// Transport namespace proposed by the action element. A message without a
/// `transport` child implies the legacy p2p transport.
pub fn parse_transport_name(action_elem: &Node) -> &str {
    action_elem
        .get_optional_child(LN_TRANSPORT)
        .map(|t| t.ns.as_str())
        .unwrap_or(NS_GINGLE_P2P)
}

/// The legacy dialect has no content names; they follow from the media type.
fn parse_content(
    elem: &Node,
    parsers: &ContentParserMap,
    protocol: SignalingProtocol,
) -> Result<ContentInfo, ParseError> {
    let parser = parsers
        .get(&elem.ns)
        .ok_or_else(|| ParseError::UnknownContentType(elem.ns.clone()))?;
    let name = match elem.attr(ATTR_NAME) {
        Some(name) if !protocol.is_legacy() => name,
        _ => content_name_for(&elem.ns),
    };
    Ok(ContentInfo {
        name: name.to_string(),
        content_type: elem.ns.clone(),
        description: parser.parse_content(elem, protocol)?,
    })
}

/// Splits a legacy video description that also carries the audio payload.
fn split_merged_description(elem: &Node) -> Option<(Node, Node)> {
    let audio_ns = elem
        .child_nodes()
        .find(|c| is_audio_content(&c.ns))
        .map(|c| c.ns.clone())?;

    let (audio_children, video_children): (Vec<Node>, Vec<Node>) = elem
        .child_nodes()
        .cloned()
        .partition(|c| c.ns == audio_ns);

    let audio = NodeBuilder::new(LN_DESCRIPTION)
        .ns(audio_ns)
        .children(audio_children)
        .build();
    let video = NodeBuilder::new(LN_DESCRIPTION)
        .ns(elem.ns.as_str())
        .attrs(elem.attrs.clone())
        .children(video_children)
        .build();
    Some((audio, video))
}

fn parse_contents(
    action_elem: &Node,
    parsers: &ContentParserMap,
    protocol: SignalingProtocol,
) -> Result<Vec<ContentInfo>, ParseError> {
    let mut contents = Vec::new();
    for elem in action_elem.get_children_by_tag(LN_DESCRIPTION) {
        let split = if is_video_content(&elem.ns) {
            split_merged_description(elem)
        } else {
            None
        };
        match split {
            Some((audio, video)) => {
                debug!("splitting merged legacy description in {}", elem.ns);
                contents.push(parse_content(&audio, parsers, protocol)?);
                contents.push(parse_content(&video, parsers, protocol)?);
            }
            None => contents.push(parse_content(elem, parsers, protocol)?),
        }
    }

    if contents.is_empty() {
        return Err(ParseError::MissingElement(LN_DESCRIPTION));
    }
    Ok(contents)
}

fn write_contents(
    contents: &[ContentInfo],
    parsers: &ContentParserMap,
    protocol: SignalingProtocol,
) -> Result<Vec<Node>, WriteError> {
    if contents.is_empty() {
        return Err(WriteError::NoContents);
    }

    let mut elems = contents
        .iter()
        .map(|content| {
            let mut elem = parsers
                .get(&content.content_type)
                .ok_or_else(|| WriteError::UnknownContentType(content.content_type.clone()))?
                .write_content(&content.content_type, content.description.as_ref())?;
            if !protocol.is_legacy() {
                elem.attrs.insert(ATTR_NAME.to_string(), content.name.clone());
            }
            Ok(elem)
        })
        .collect::<Result<Vec<_>, WriteError>>()?;

    if !protocol.is_legacy() || elems.len() == 1 {
        return Ok(elems);
    }

    // The legacy dialect carries a single description; audio+video is
    // expressed as the video element extended with the audio payload.
    let audio_idx = contents
        .iter()
        .position(|c| is_audio_content(&c.content_type));
    let has_video = contents.iter().any(|c| is_video_content(&c.content_type));
    match (elems.len(), audio_idx, has_video) {
        (2, Some(audio_idx), true) => {
            let audio = elems.swap_remove(audio_idx);
            let mut video = elems.remove(0);
            video.add_children(audio.child_nodes().cloned());
            Ok(vec![video])
        }
        _ => Err(WriteError::LegacySingleContent),
    }
}

fn transport_element(transport_name: &str, candidates: Vec<Node>) -> Node {
    NodeBuilder::new(LN_TRANSPORT)
        .ns(transport_name)
        .children(candidates)
        .build()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionInitiate {
    /// Namespace of the proposed transport.
    pub transport_name: String,
    pub contents: Vec<ContentInfo>,
}

impl SessionInitiate {
    pub fn new(transport_name: impl Into<String>, contents: Vec<ContentInfo>) -> Self {
        Self {
            transport_name: transport_name.into(),
            contents,
        }
    }

    pub fn parse(
        action_elem: &Node,
        parsers: &ContentParserMap,
        protocol: SignalingProtocol,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            contents: parse_contents(action_elem, parsers, protocol)?,
            transport_name: parse_transport_name(action_elem).to_string(),
        })
    }

    /// No candidates exist yet at initiate time, so only the transport name is
    /// written; the legacy dialect has no way to express it and writes nothing.
    pub fn write(
        &self,
        parsers: &ContentParserMap,
        protocol: SignalingProtocol,
    ) -> Result<Vec<Node>, WriteError> {
        let mut elems = write_contents(&self.contents, parsers, protocol)?;
        if protocol.wraps_transport() {
            elems.push(transport_element(&self.transport_name, Vec::new()));
        }
        Ok(elems)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionAccept {
    pub contents: Vec<ContentInfo>,
}

impl SessionAccept {
    pub fn new(contents: Vec<ContentInfo>) -> Self {
        Self { contents }
    }

    pub fn parse(
        action_elem: &Node,
        parsers: &ContentParserMap,
        protocol: SignalingProtocol,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            contents: parse_contents(action_elem, parsers, protocol)?,
        })
    }

    pub fn write(
        &self,
        parsers: &ContentParserMap,
        protocol: SignalingProtocol,
    ) -> Result<Vec<Node>, WriteError> {
        write_contents(&self.contents, parsers, protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionTerminate {
    pub reason: String,
    pub debug_reason: String,
}

impl SessionTerminate {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            debug_reason: String::new(),
        }
    }

    pub fn parse(action_elem: &Node) -> Self {
        let reason_elem = action_elem.first_child();
        Self {
            reason: reason_elem.map(|r| r.tag.clone()).unwrap_or_default(),
            debug_reason: reason_elem
                .and_then(Node::first_child)
                .map(|d| d.tag.clone())
                .unwrap_or_default(),
        }
    }

    pub fn write(&self) -> Vec<Node> {
        if self.reason.is_empty() {
            return Vec::new();
        }
        let mut reason = NodeBuilder::new(self.reason.as_str()).ns(NS_GINGLE).build();
        if !self.debug_reason.is_empty() {
            reason.add_child(NodeBuilder::new(self.debug_reason.as_str()).ns(NS_GINGLE).build());
        }
        vec![reason]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportInfo {
    pub transport_name: String,
    pub candidates: Vec<Candidate>,
}

impl TransportInfo {
    pub fn new(transport_name: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        Self {
            transport_name: transport_name.into(),
            candidates,
        }
    }

    pub fn parse(action_elem: &Node, parsers: &TransportParserMap) -> Result<Self, ParseError> {
        let (transport_name, candidates_elem) = match action_elem.get_optional_child(LN_TRANSPORT) {
            Some(transport) => (transport.ns.as_str(), transport),
            None => (NS_GINGLE_P2P, action_elem),
        };
        let parser = parsers
            .get(transport_name)
            .ok_or_else(|| ParseError::UnknownTransport(transport_name.to_string()))?;
        Ok(Self {
            transport_name: transport_name.to_string(),
            candidates: parser.parse_candidates(candidates_elem)?,
        })
    }

    /// The standardized dialect always wraps candidates in a `transport`
    /// element, even when there are none; the legacy dialect writes bare
    /// candidates, so an empty list produces no elements at all.
    pub fn write(
        &self,
        parsers: &TransportParserMap,
        protocol: SignalingProtocol,
    ) -> Result<Vec<Node>, WriteError> {
        let parser = parsers
            .get(&self.transport_name)
            .ok_or_else(|| WriteError::UnknownTransport(self.transport_name.clone()))?;
        let candidates = parser.write_candidates(&self.candidates, protocol);
        if protocol.wraps_transport() {
            Ok(vec![transport_element(&self.transport_name, candidates)])
        } else {
            Ok(candidates)
        }
    }
}
