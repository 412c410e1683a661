use jingle_xml::XmlError;
use serde::Serialize;
use thiserror::Error;

/// Defined stanza error conditions used in error replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StanzaErrorCondition {
    BadRequest,
    NotAllowed,
    NotAcceptable,
    ItemNotFound,
}

impl StanzaErrorCondition {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::NotAllowed => "not-allowed",
            Self::NotAcceptable => "not-acceptable",
            Self::ItemNotFound => "item-not-found",
        }
    }
}

impl std::fmt::Display for StanzaErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inbound element that does not fit the session schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("missing required element: {0}")]
    MissingElement(&'static str),
    #[error("bad attributes: {0}")]
    Attributes(#[from] XmlError),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("unknown application format: {0}")]
    UnknownContentType(String),
    #[error("unknown transport type: {0}")]
    UnknownTransport(String),
    #[error("unknown media content type: {0}")]
    UnknownMediaType(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ParseError {
    /// Attribute names reported missing, empty for other kinds of failure.
    pub fn missing_attrs(&self) -> Vec<&str> {
        match self {
            ParseError::Attributes(e) => e.missing_attrs(),
            _ => Vec::new(),
        }
    }
}

/// An outbound message that cannot be expressed in the requested dialect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("no contents to write")]
    NoContents,
    #[error("legacy dialect supports only one content")]
    LegacySingleContent,
    #[error("unknown content type: {0}")]
    UnknownContentType(String),
    #[error("unknown transport type: {0}")]
    UnknownTransport(String),
    #[error("content description does not match content type {0}")]
    DescriptionMismatch(String),
}
