//! Wire-level half of the signaling engine: the data model shared by both
//! peers and the codec that moves it in and out of session stanzas.
//!
//! Nothing in this crate holds session state. Every function is a pure
//! translation between [`Node`](jingle_xml::Node) trees and typed messages.

pub use jingle_xml as xml;

pub mod constants;
pub mod error;
pub mod media;
pub mod messages;
pub mod p2p;
pub mod parsers;
pub mod types;

pub use error::{ParseError, StanzaErrorCondition, WriteError};
pub use messages::{
    SessionAccept, SessionInitiate, SessionMessage, SessionStanzaBuilder, SessionTerminate,
    TransportInfo,
};
pub use parsers::{ContentParser, ContentParserMap, TransportParser, TransportParserMap};
pub use types::{
    ActionType, Candidate, ContentDescription, ContentInfo, SessionDescription, SessionId,
    SignalingProtocol,
};
