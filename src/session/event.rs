use jingle_core::StanzaErrorCondition;
use jingle_core::xml::Node;

use super::state::{ErrorCode, State};

/// Notifications a session queues for its owner, in the order they happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(State),
    ErrorChanged(ErrorCode),
    /// A channel was destroyed or lost its implementation.
    ChannelGone(String),
    /// Children of a `session-info` message from the peer, as received.
    InfoMessage(Vec<Node>),
    /// Reason element name carried by the peer's terminate.
    TerminateReason(String),
    /// A stanza ready for the wire.
    OutgoingMessage(Node),
    /// An error reply should be sent for `original`.
    ErrorMessage {
        original: Node,
        condition: StanzaErrorCondition,
        error_type: String,
        text: String,
    },
    /// The session finished terminating and should be destroyed.
    DestroyRequested,
}
