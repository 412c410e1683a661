//! Session-related error types.

use jingle_core::{ParseError, StanzaErrorCondition, WriteError};
use thiserror::Error;

use super::state::InvalidTransition;

/// Why a local operation on a session or the manager was refused.
///
/// A refused operation never leaves side effects behind: no state change, no
/// outgoing message.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("invalid session state transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("failed to write session message: {0}")]
    Write(#[from] WriteError),

    #[error("no client registered for content type {0}")]
    UnknownContentType(String),
}

/// Why an inbound session message was refused. Becomes an error reply to the
/// sender.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{condition}: {text}")]
pub struct MessageError {
    pub condition: StanzaErrorCondition,
    pub text: String,
}

impl MessageError {
    pub fn new(condition: StanzaErrorCondition, text: impl Into<String>) -> Self {
        Self {
            condition,
            text: text.into(),
        }
    }

    pub fn not_allowed() -> Self {
        Self::new(
            StanzaErrorCondition::NotAllowed,
            "message not allowed in current state",
        )
    }
}

impl From<ParseError> for MessageError {
    fn from(err: ParseError) -> Self {
        Self::new(StanzaErrorCondition::BadRequest, err.to_string())
    }
}

impl From<InvalidTransition> for MessageError {
    fn from(_: InvalidTransition) -> Self {
        Self::not_allowed()
    }
}
