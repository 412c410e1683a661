use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Identifies a session across both peers: the id string chosen by the
/// initiator, qualified by the initiator's address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId {
    pub id: String,
    pub initiator: String,
}

impl SessionId {
    pub fn new(id: impl Into<String>, initiator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            initiator: initiator.into(),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.initiator, self.id)
    }
}

/// Which signaling dialect a message is written in, or a session speaks.
///
/// `Gingle` is the legacy layout: candidates sit directly under the action
/// element and candidate exchange uses the `candidates` action. Every other
/// variant uses the standardized layout, with candidates wrapped in a
/// namespaced `transport` element and exchanged via `transport-info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalingProtocol {
    Jingle,
    Gingle,
    /// Transitional dialect: Gingle envelope with the standardized layout.
    #[default]
    Gingle2,
    /// Speaks the standardized layout but falls back on the first legacy message.
    Hybrid,
}

impl SignalingProtocol {
    pub const ALL: [SignalingProtocol; 4] = [Self::Jingle, Self::Gingle, Self::Gingle2, Self::Hybrid];

    pub const fn is_legacy(&self) -> bool {
        matches!(self, Self::Gingle)
    }

    /// Whether candidates are wrapped in a `transport` element.
    pub const fn wraps_transport(&self) -> bool {
        !self.is_legacy()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Jingle => "jingle",
            Self::Gingle => "gingle",
            Self::Gingle2 => "gingle2",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SignalingProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignalingProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown signaling protocol: {s}"))
    }
}

/// The `type` of a session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ActionType {
    #[default]
    Unknown,
    SessionInitiate,
    SessionInfo,
    SessionAccept,
    SessionReject,
    SessionTerminate,
    TransportInfo,
    TransportAccept,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        Self::Unknown,
        Self::SessionInitiate,
        Self::SessionInfo,
        Self::SessionAccept,
        Self::SessionReject,
        Self::SessionTerminate,
        Self::TransportInfo,
        Self::TransportAccept,
    ];

    /// Maps an action string to its type. Both the Gingle names and the
    /// standard Jingle names are recognized; anything else is `Unknown`.
    pub fn classify(type_str: &str) -> Self {
        match type_str {
            GINGLE_ACTION_INITIATE | JINGLE_ACTION_SESSION_INITIATE => Self::SessionInitiate,
            GINGLE_ACTION_INFO | JINGLE_ACTION_SESSION_INFO => Self::SessionInfo,
            GINGLE_ACTION_ACCEPT | JINGLE_ACTION_SESSION_ACCEPT => Self::SessionAccept,
            GINGLE_ACTION_REJECT => Self::SessionReject,
            GINGLE_ACTION_TERMINATE | JINGLE_ACTION_SESSION_TERMINATE => Self::SessionTerminate,
            GINGLE_ACTION_CANDIDATES | JINGLE_ACTION_TRANSPORT_INFO => Self::TransportInfo,
            JINGLE_ACTION_TRANSPORT_ACCEPT => Self::TransportAccept,
            _ => Self::Unknown,
        }
    }

    /// The action string written on the wire for `protocol`.
    pub const fn render(&self, protocol: SignalingProtocol) -> &'static str {
        match self {
            Self::SessionInitiate => GINGLE_ACTION_INITIATE,
            Self::SessionInfo => GINGLE_ACTION_INFO,
            Self::SessionAccept => GINGLE_ACTION_ACCEPT,
            Self::SessionReject => GINGLE_ACTION_REJECT,
            Self::SessionTerminate => GINGLE_ACTION_TERMINATE,
            Self::TransportInfo if protocol.is_legacy() => GINGLE_ACTION_CANDIDATES,
            Self::TransportInfo => JINGLE_ACTION_TRANSPORT_INFO,
            Self::TransportAccept => JINGLE_ACTION_TRANSPORT_ACCEPT,
            Self::Unknown => "",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            other => other.render(SignalingProtocol::Gingle2),
        };
        f.write_str(name)
    }
}
