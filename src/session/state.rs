//! Session lifecycle states and the transitions between them.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum State {
    #[default]
    Init,
    SentInitiate,
    ReceivedInitiate,
    SentAccept,
    ReceivedAccept,
    /// Reserved for renegotiation; nothing enters it today.
    SentModify,
    /// Reserved for renegotiation; a session here may still be rejected.
    ReceivedModify,
    SentReject,
    ReceivedReject,
    SentTerminate,
    ReceivedTerminate,
    InProgress,
    /// The session has been torn down and its channels destroyed.
    Deinit,
}

impl State {
    pub const ALL: [State; 13] = [
        Self::Init,
        Self::SentInitiate,
        Self::ReceivedInitiate,
        Self::SentAccept,
        Self::ReceivedAccept,
        Self::SentModify,
        Self::ReceivedModify,
        Self::SentReject,
        Self::ReceivedReject,
        Self::SentTerminate,
        Self::ReceivedTerminate,
        Self::InProgress,
        Self::Deinit,
    ];

    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::SentReject | Self::ReceivedReject)
    }

    pub const fn is_terminating(&self) -> bool {
        matches!(self, Self::SentTerminate | Self::ReceivedTerminate)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::SentInitiate => "sent-initiate",
            Self::ReceivedInitiate => "received-initiate",
            Self::SentAccept => "sent-accept",
            Self::ReceivedAccept => "received-accept",
            Self::SentModify => "sent-modify",
            Self::ReceivedModify => "received-modify",
            Self::SentReject => "sent-reject",
            Self::ReceivedReject => "received-reject",
            Self::SentTerminate => "sent-terminate",
            Self::ReceivedTerminate => "received-terminate",
            Self::InProgress => "in-progress",
            Self::Deinit => "deinit",
        }
    }

    /// Computes the state reached by `transition`, or refuses it.
    ///
    /// This is the only place that decides which transitions are legal; the
    /// session validates every public operation here before producing any
    /// side effect.
    pub fn apply(self, transition: SessionTransition) -> Result<State, InvalidTransition> {
        use SessionTransition as T;

        let next = match (self, transition) {
            (Self::Init, T::SendInitiate) => Self::SentInitiate,
            (Self::Init, T::ReceiveInitiate) => Self::ReceivedInitiate,
            (Self::ReceivedInitiate, T::SendAccept) => Self::SentAccept,
            (Self::ReceivedInitiate | Self::ReceivedModify, T::SendReject) => Self::SentReject,
            (Self::SentInitiate, T::ReceiveAccept) => Self::ReceivedAccept,
            (Self::SentInitiate, T::ReceiveReject) => Self::ReceivedReject,
            (Self::SentAccept | Self::ReceivedAccept, T::Established) => Self::InProgress,
            (current, T::SendTerminate) if !current.is_terminating() && current != Self::Deinit => {
                Self::SentTerminate
            }
            (current, T::ReceiveTerminate) if current != Self::Deinit => Self::ReceivedTerminate,
            (current, T::Destroy) if current != Self::Deinit => Self::Deinit,
            (current, attempted) => {
                return Err(InvalidTransition {
                    current_state: current,
                    attempted,
                });
            }
        };
        Ok(next)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error condition of a session. Anything other than `None` ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ErrorCode {
    #[default]
    None,
    /// The transport never became writable within the session timeout.
    Timeout,
    /// The peer answered one of our messages with a fatal error.
    Response,
    /// The transport reported a failure it cannot recover from.
    Network,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Timeout => "timeout",
            Self::Response => "response",
            Self::Network => "network",
        };
        f.write_str(name)
    }
}

/// State transitions for sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    SendInitiate,
    ReceiveInitiate,
    SendAccept,
    ReceiveAccept,
    SendReject,
    ReceiveReject,
    SendTerminate,
    ReceiveTerminate,
    /// Both sides agreed; media may flow.
    Established,
    Destroy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub current_state: State,
    pub attempted: SessionTransition,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid transition {:?} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flow: Init → SentInitiate → ReceivedAccept → InProgress → SentTerminate → Deinit
    #[test]
    fn test_outgoing_session_flow() {
        let state = State::Init.apply(SessionTransition::SendInitiate).unwrap();
        assert_eq!(state, State::SentInitiate);

        let state = state.apply(SessionTransition::ReceiveAccept).unwrap();
        assert_eq!(state, State::ReceivedAccept);

        let state = state.apply(SessionTransition::Established).unwrap();
        assert_eq!(state, State::InProgress);

        let state = state.apply(SessionTransition::SendTerminate).unwrap();
        assert!(state.is_terminating());

        assert_eq!(state.apply(SessionTransition::Destroy).unwrap(), State::Deinit);
    }

    /// Flow: Init → ReceivedInitiate → SentReject
    #[test]
    fn test_incoming_session_rejected() {
        let state = State::Init.apply(SessionTransition::ReceiveInitiate).unwrap();
        let state = state.apply(SessionTransition::SendReject).unwrap();
        assert!(state.is_rejected());
    }

    #[test]
    fn test_initiate_only_from_init() {
        for state in State::ALL.into_iter().filter(|s| *s != State::Init) {
            let err = state.apply(SessionTransition::SendInitiate).unwrap_err();
            assert_eq!(err.current_state, state);
            assert_eq!(err.attempted, SessionTransition::SendInitiate);
        }
    }

    #[test]
    fn test_accept_only_from_received_initiate() {
        for state in State::ALL {
            let result = state.apply(SessionTransition::SendAccept);
            assert_eq!(result.is_ok(), state == State::ReceivedInitiate, "{state}");
        }
    }

    #[test]
    fn test_reject_allowed_from_received_modify() {
        assert_eq!(
            State::ReceivedModify.apply(SessionTransition::SendReject),
            Ok(State::SentReject)
        );
        assert!(State::SentInitiate.apply(SessionTransition::SendReject).is_err());
    }

    #[test]
    fn test_terminate_refused_once_terminating() {
        for state in [State::SentTerminate, State::ReceivedTerminate, State::Deinit] {
            assert!(state.apply(SessionTransition::SendTerminate).is_err(), "{state}");
        }
        for state in [State::Init, State::SentReject, State::InProgress, State::SentModify] {
            assert_eq!(
                state.apply(SessionTransition::SendTerminate),
                Ok(State::SentTerminate)
            );
        }
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = State::Deinit.apply(SessionTransition::Destroy).unwrap_err();
        assert_eq!(err.to_string(), "invalid transition Destroy in state deinit");
    }
}
