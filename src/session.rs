//! One signaling session between two peers.
//!
//! A [`Session`] is a sans-IO state machine. Public operations validate the
//! lifecycle, emit outgoing stanzas as [`SessionEvent::OutgoingMessage`], and
//! queue follow-up work. Nothing happens re-entrantly: automatic transitions
//! (accept to in-progress, reject to terminate, terminate to destroy) run
//! when the owner calls [`Session::process_tasks`], after the call that
//! caused them has returned.
//!
//! # Lifecycle
//!
//! ```text
//! Init ──initiate──▶ SentInitiate ──accept──▶ ReceivedAccept ─┐
//!   │                     └──reject──▶ ReceivedReject ─┐      ├─▶ InProgress
//!   └─initiate─▶ ReceivedInitiate ──accept()──▶ SentAccept ────┘
//!                     └──reject()──▶ SentReject ─┐
//!                                                ▼
//!                     (any) ──terminate──▶ SentTerminate / ReceivedTerminate ──▶ Deinit
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jingle_core::constants::{
    ATTR_TYPE, ERROR_TYPE_CANCEL, ERROR_TYPE_CONTINUE, ERROR_TYPE_MODIFY, ERROR_TYPE_WAIT, LN_ERROR,
};
use jingle_core::messages::{build_session_ack, parse_session_message};
use jingle_core::xml::{DisplayableNode, Node};
use jingle_core::{
    ActionType, Candidate, ContentParserMap, SessionAccept, SessionDescription, SessionId,
    SessionInitiate, SessionMessage, SessionStanzaBuilder, SessionTerminate, SignalingProtocol,
    StanzaErrorCondition, TransportInfo, TransportParserMap,
};
use log::{debug, error, info, warn};
use tokio::time::Instant;

use crate::client::{InitiateResponse, SessionClient};
use crate::transport::{Transport, TransportEvent};

pub mod error;
pub mod event;
pub mod negotiation;
pub mod state;

pub use error::{MessageError, SessionError};
pub use event::SessionEvent;
pub use negotiation::{TransportChannelProxy, TransportNegotiator};
pub use state::{ErrorCode, InvalidTransition, SessionTransition, State};

/// How long the transport may stay unwritable before the session gives up.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTask {
    /// Follow-up for entering a state. Dropped if the state moved on.
    StateTick(State),
    ErrorTick,
}

pub struct Session {
    id: SessionId,
    local_name: String,
    remote_name: String,
    content_type: String,
    initiator: bool,
    state: State,
    error: ErrorCode,
    protocol: SignalingProtocol,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    negotiator: TransportNegotiator,
    content_parsers: ContentParserMap,
    transport_parsers: TransportParserMap,
    client: Option<Arc<dyn SessionClient>>,
    session_timeout: Duration,
    timeout_deadline: Option<Instant>,
    tasks: VecDeque<SessionTask>,
    events: VecDeque<SessionEvent>,
    next_stanza_id: u64,
    created_at: DateTime<Utc>,
    state_changed_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        id: SessionId,
        local_name: impl Into<String>,
        content_type: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Self {
        let local_name = local_name.into();
        let mut transport_parsers = TransportParserMap::new();
        transport_parsers.insert(transport.name().to_string(), transport.parser());
        let now = Utc::now();

        Self {
            initiator: id.initiator == local_name,
            id,
            local_name,
            remote_name: String::new(),
            content_type: content_type.into(),
            state: State::Init,
            error: ErrorCode::None,
            protocol: SignalingProtocol::default(),
            local_description: None,
            remote_description: None,
            negotiator: TransportNegotiator::new(transport),
            content_parsers: ContentParserMap::new(),
            transport_parsers,
            client: None,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            timeout_deadline: None,
            tasks: VecDeque::new(),
            events: VecDeque::new(),
            next_stanza_id: 0,
            created_at: now,
            state_changed_at: now,
        }
    }

    pub fn with_protocol(mut self, protocol: SignalingProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_content_parsers(mut self, parsers: ContentParserMap) -> Self {
        self.content_parsers = parsers;
        self
    }

    pub fn with_client(mut self, client: Arc<dyn SessionClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn error(&self) -> ErrorCode {
        self.error
    }

    pub fn protocol(&self) -> SignalingProtocol {
        self.protocol
    }

    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_description(&self) -> Option<&SessionDescription> {
        self.remote_description.as_ref()
    }

    pub fn transport(&self) -> &dyn Transport {
        self.negotiator.transport()
    }

    pub fn is_transport_negotiated(&self) -> bool {
        self.negotiator.is_negotiated()
    }

    /// Candidates signaled while negotiation is still pending.
    pub fn sent_candidates(&self) -> &[Candidate] {
        self.negotiator.sent_candidates()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state_changed_at(&self) -> DateTime<Utc> {
        self.state_changed_at
    }

    // ---- events and deferred work ----

    pub fn poll_event(&mut self) -> Option<SessionEvent> {
        self.events.pop_front()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Runs transport events and queued follow-ups until both are exhausted.
    pub fn process_tasks(&mut self) {
        loop {
            while let Some(event) = self.negotiator.transport_mut().poll_event() {
                self.on_transport_event(event);
            }
            let Some(task) = self.tasks.pop_front() else {
                break;
            };
            match task {
                SessionTask::StateTick(state) => self.on_state_tick(state),
                SessionTask::ErrorTick => self.on_error_tick(),
            }
        }
    }

    /// Deadline of the writability watchdog, if armed.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.timeout_deadline
    }

    pub fn handle_timeout(&mut self, now: Instant) {
        match self.timeout_deadline {
            Some(deadline) if now >= deadline => {
                self.timeout_deadline = None;
                warn!(target: "Session", "{} transport not writable after {:?}", self.id, self.session_timeout);
                self.set_error(ErrorCode::Timeout);
            }
            _ => {}
        }
    }

    fn set_state(&mut self, state: State) {
        if self.state == state {
            return;
        }
        debug!(target: "Session", "{} {} -> {}", self.id, self.state, state);
        self.state = state;
        self.state_changed_at = Utc::now();
        self.events.push_back(SessionEvent::StateChanged(state));
        self.tasks.push_back(SessionTask::StateTick(state));
    }

    fn transition(&mut self, transition: SessionTransition) -> Result<(), InvalidTransition> {
        let next = self.state.apply(transition)?;
        self.set_state(next);
        Ok(())
    }

    pub fn set_error(&mut self, error: ErrorCode) {
        if self.error == error {
            return;
        }
        info!(target: "Session", "{} error: {}", self.id, error);
        self.error = error;
        self.events.push_back(SessionEvent::ErrorChanged(error));
        self.tasks.push_back(SessionTask::ErrorTick);
    }

    fn on_state_tick(&mut self, posted: State) {
        if self.state != posted {
            return;
        }
        match posted {
            State::SentAccept | State::ReceivedAccept => {
                let _ = self.transition(SessionTransition::Established);
            }
            State::SentReject | State::ReceivedReject => {
                let _ = self.terminate();
            }
            State::SentTerminate | State::ReceivedTerminate => {
                self.events.push_back(SessionEvent::DestroyRequested);
            }
            _ => {}
        }
    }

    fn on_error_tick(&mut self) {
        if self.error != ErrorCode::None {
            let _ = self.terminate();
        }
    }

    // ---- local operations ----

    /// Offers `description` to `to`. Only legal in `Init`.
    pub fn initiate(
        &mut self,
        to: impl Into<String>,
        description: SessionDescription,
    ) -> Result<(), SessionError> {
        self.state.apply(SessionTransition::SendInitiate)?;
        let elems = SessionInitiate::new(
            self.negotiator.transport_name(),
            description.contents.clone(),
        )
        .write(&self.content_parsers, self.protocol)?;

        self.remote_name = to.into();
        self.initiator = true;
        self.local_description = Some(description);
        self.send_action(ActionType::SessionInitiate, elems);
        self.transition(SessionTransition::SendInitiate)?;
        self.negotiator.connect_default_channels();
        Ok(())
    }

    /// Accepts the peer's offer. Until the transport is negotiated the
    /// description is only stored; the accept goes out when negotiation
    /// completes.
    pub fn accept(&mut self, description: SessionDescription) -> Result<(), SessionError> {
        self.state.apply(SessionTransition::SendAccept)?;
        let elems = SessionAccept::new(description.contents.clone())
            .write(&self.content_parsers, self.protocol)?;
        self.local_description = Some(description);

        if !self.negotiator.is_negotiated() {
            debug!(target: "Session", "{} accept deferred until transport is negotiated", self.id);
            return Ok(());
        }
        self.send_action(ActionType::SessionAccept, elems);
        self.transition(SessionTransition::SendAccept)?;
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), SessionError> {
        self.state.apply(SessionTransition::SendReject)?;
        self.send_action(ActionType::SessionReject, Vec::new());
        self.transition(SessionTransition::SendReject)?;
        Ok(())
    }

    pub fn terminate(&mut self) -> Result<(), SessionError> {
        self.terminate_with_reason("")
    }

    /// Ends the session. A rejected session already told the peer, so no
    /// terminate message is sent from the reject states.
    pub fn terminate_with_reason(&mut self, reason: &str) -> Result<(), SessionError> {
        self.state.apply(SessionTransition::SendTerminate)?;
        if !self.state.is_rejected() && !self.remote_name.is_empty() {
            self.send_action(
                ActionType::SessionTerminate,
                SessionTerminate::new(reason).write(),
            );
        }
        self.transition(SessionTransition::SendTerminate)?;
        Ok(())
    }

    /// Creates a channel proxy. In `SentInitiate` the implementation is
    /// created right away so connectivity checks overlap the offer.
    pub fn create_channel(&mut self, content_type: &str, name: &str) -> &TransportChannelProxy {
        let preconnect = self.state == State::SentInitiate;
        self.negotiator.create_channel(name, content_type, preconnect)
    }

    pub fn get_channel(&self, name: &str) -> Option<&TransportChannelProxy> {
        self.negotiator.get_channel(name)
    }

    pub fn destroy_channel(&mut self, name: &str) -> bool {
        match self.negotiator.destroy_channel(name) {
            Some(_) => {
                self.events
                    .push_back(SessionEvent::ChannelGone(name.to_string()));
                true
            }
            None => false,
        }
    }

    /// Final teardown: destroys every channel and enters `Deinit`.
    pub fn deinit(&mut self) {
        self.timeout_deadline = None;
        self.negotiator.destroy_all_channels();
        if self.transition(SessionTransition::Destroy).is_ok() {
            self.tasks.clear();
        }
    }

    // ---- inbound ----

    /// Handles one parsed session message addressed to this session,
    /// replying with an acknowledgement or an error.
    pub fn on_incoming_message(&mut self, msg: &SessionMessage<'_>) {
        debug!(
            target: "Session",
            "{} received {} ({})",
            self.id, msg.action, msg.protocol
        );

        if msg.protocol.is_legacy() && !self.protocol.is_legacy() {
            self.downgrade_to_legacy();
        }

        let result = match msg.action {
            ActionType::SessionInitiate => self.on_initiate_message(msg),
            ActionType::SessionInfo => self.on_info_message(msg),
            ActionType::SessionAccept => self.on_accept_message(msg),
            ActionType::SessionReject => self.on_reject_message(),
            ActionType::SessionTerminate => self.on_terminate_message(msg),
            ActionType::TransportInfo => self.on_transport_info_message(msg),
            // Accepted and acknowledged for old clients; carries nothing we use.
            ActionType::TransportAccept => Ok(()),
            ActionType::Unknown => Err(MessageError::new(
                StanzaErrorCondition::BadRequest,
                "unknown session action",
            )),
        };

        match result {
            Ok(()) => {
                self.events
                    .push_back(SessionEvent::OutgoingMessage(build_session_ack(msg)));
            }
            Err(e) => {
                warn!(
                    target: "Session",
                    "{} refusing {}: {}",
                    self.id, msg.action, e
                );
                self.events.push_back(SessionEvent::ErrorMessage {
                    original: msg.stanza.clone(),
                    condition: e.condition,
                    error_type: ERROR_TYPE_MODIFY.to_string(),
                    text: e.text,
                });
            }
        }
    }

    /// The peer only speaks the legacy dialect: switch for good, and resend
    /// anything the peer could not have read.
    fn downgrade_to_legacy(&mut self) {
        info!(
            target: "Session",
            "{} peer speaks {}, downgrading from {}",
            self.id,
            SignalingProtocol::Gingle,
            self.protocol
        );
        self.protocol = SignalingProtocol::Gingle;
        if !self.negotiator.is_negotiated() {
            let candidates = self.negotiator.take_sent_candidates();
            if !candidates.is_empty() {
                self.send_transport_info(candidates);
            }
        }
    }

    fn check_state(&self, expected: State) -> Result<(), MessageError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(MessageError::not_allowed())
        }
    }

    fn on_initiate_message(&mut self, msg: &SessionMessage<'_>) -> Result<(), MessageError> {
        self.check_state(State::Init)?;
        let init = SessionInitiate::parse(msg.action_elem, &self.content_parsers, self.protocol)?;
        if init.transport_name != self.negotiator.transport_name() {
            return Err(MessageError::new(
                StanzaErrorCondition::NotAcceptable,
                "no supported transport in offer",
            ));
        }

        self.initiator = false;
        self.remote_name = msg.from.clone();
        self.remote_description = Some(SessionDescription::with_contents(init.contents));
        self.transition(SessionTransition::ReceiveInitiate)?;

        let response = match (&self.client, &self.remote_description) {
            (Some(client), Some(offer)) => client.on_incoming_initiate(&self.id, offer),
            _ => InitiateResponse::Pending,
        };
        match response {
            InitiateResponse::Accept(answer) => {
                if let Err(e) = self.accept(answer) {
                    error!(target: "Session", "{} failed to accept offer: {}", self.id, e);
                }
            }
            InitiateResponse::Reject => {
                let _ = self.reject();
            }
            InitiateResponse::Pending => {}
        }

        if !self.state.is_rejected() {
            self.on_transport_negotiated();
        }
        Ok(())
    }

    fn on_accept_message(&mut self, msg: &SessionMessage<'_>) -> Result<(), MessageError> {
        self.check_state(State::SentInitiate)?;
        let accept = SessionAccept::parse(msg.action_elem, &self.content_parsers, self.protocol)?;
        self.remote_description = Some(SessionDescription::with_contents(accept.contents));
        self.transition(SessionTransition::ReceiveAccept)?;
        Ok(())
    }

    fn on_reject_message(&mut self) -> Result<(), MessageError> {
        self.check_state(State::SentInitiate)?;
        self.transition(SessionTransition::ReceiveReject)?;
        Ok(())
    }

    fn on_info_message(&mut self, msg: &SessionMessage<'_>) -> Result<(), MessageError> {
        self.events
            .push_back(SessionEvent::InfoMessage(
                msg.action_elem.child_nodes().cloned().collect(),
            ));
        Ok(())
    }

    fn on_terminate_message(&mut self, msg: &SessionMessage<'_>) -> Result<(), MessageError> {
        let terminate = SessionTerminate::parse(msg.action_elem);
        let next = self.state.apply(SessionTransition::ReceiveTerminate)?;
        self.events
            .push_back(SessionEvent::TerminateReason(terminate.reason));
        self.set_state(next);
        Ok(())
    }

    fn on_transport_info_message(&mut self, msg: &SessionMessage<'_>) -> Result<(), MessageError> {
        let info = TransportInfo::parse(msg.action_elem, &self.transport_parsers)?;
        if info.transport_name != self.negotiator.transport_name() {
            error!(
                target: "Session",
                "{} candidates for {} but negotiating {}",
                self.id,
                info.transport_name,
                self.negotiator.transport_name()
            );
            return Ok(());
        }
        self.negotiator
            .transport_mut()
            .on_remote_candidates(&info.candidates);
        self.on_transport_negotiated();
        Ok(())
    }

    /// Latches negotiation the first time the peer proves it speaks our
    /// transport, then flushes an accept the application already issued.
    fn on_transport_negotiated(&mut self) {
        if !self.negotiator.negotiate() {
            return;
        }
        info!(target: "Session", "{} transport {} negotiated", self.id, self.negotiator.transport_name());
        self.send_deferred_accept();
    }

    fn send_deferred_accept(&mut self) {
        if self.state != State::ReceivedInitiate {
            return;
        }
        let Some(description) = &self.local_description else {
            return;
        };
        match SessionAccept::new(description.contents.clone())
            .write(&self.content_parsers, self.protocol)
        {
            Ok(elems) => {
                self.send_action(ActionType::SessionAccept, elems);
                let _ = self.transition(SessionTransition::SendAccept);
            }
            Err(e) => {
                error!(target: "Session", "{} failed to write deferred accept: {}", self.id, e);
                let _ = self.terminate();
            }
        }
    }

    /// Reacts to an error reply to a stanza this session sent.
    ///
    /// Errors on candidate messages belong to the transport and never end the
    /// session. Any other error ends it unless the peer asked us to retry.
    pub fn on_failed_send(&mut self, original: &Node, error_stanza: &Node) {
        let msg = match parse_session_message(original) {
            Ok(msg) => msg,
            Err(e) => {
                error!(target: "Session", "{} error reply to unreadable stanza: {}", self.id, e);
                return;
            }
        };
        let error_elem = error_stanza.get_optional_child(LN_ERROR);
        let error_type = error_elem
            .and_then(|e| e.attr(ATTR_TYPE))
            .unwrap_or(ERROR_TYPE_CANCEL);

        warn!(
            target: "Session",
            "{} error reply {} to {}",
            self.id,
            DisplayableNode(error_stanza),
            DisplayableNode(original)
        );

        if msg.action == ActionType::TransportInfo {
            let transport_name = self.negotiator.transport_name().to_string();
            let transport_errors = error_elem
                .into_iter()
                .flat_map(|e| e.child_nodes())
                .filter(|child| child.ns == transport_name);
            for child in transport_errors {
                self.negotiator.transport_mut().on_transport_error(child);
            }
        } else if error_type != ERROR_TYPE_CONTINUE && error_type != ERROR_TYPE_WAIT {
            self.set_error(ErrorCode::Response);
        }
    }

    // ---- transport ----

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connecting | TransportEvent::WritableChanged => {
                self.on_transport_writable()
            }
            TransportEvent::CandidatesReady(candidates) => self.on_candidates_ready(candidates),
            TransportEvent::SendError {
                stanza,
                condition,
                error_type,
                text,
            } => self.events.push_back(SessionEvent::ErrorMessage {
                original: stanza,
                condition,
                error_type,
                text,
            }),
            TransportEvent::ChannelGone(name) => {
                if self.negotiator.unbind_channel(&name) {
                    self.events.push_back(SessionEvent::ChannelGone(name));
                }
            }
            TransportEvent::Failed(reason) => {
                error!(target: "Session", "{} transport failed: {}", self.id, reason);
                self.set_error(ErrorCode::Network);
            }
        }
    }

    /// Re-arms the watchdog while channels exist but cannot send, and
    /// cancels it otherwise.
    fn on_transport_writable(&mut self) {
        self.timeout_deadline = None;
        if self.negotiator.has_channels() && !self.negotiator.writable() {
            self.timeout_deadline = Some(Instant::now() + self.session_timeout);
        }
    }

    fn on_candidates_ready(&mut self, candidates: Vec<Candidate>) {
        self.negotiator.buffer_candidates(&candidates);
        self.send_transport_info(candidates);
    }

    fn send_transport_info(&mut self, candidates: Vec<Candidate>) {
        let info = TransportInfo::new(self.negotiator.transport_name(), candidates);
        match info.write(&self.transport_parsers, self.protocol) {
            Ok(elems) => self.send_action(ActionType::TransportInfo, elems),
            Err(e) => error!(target: "Session", "{} failed to write candidates: {}", self.id, e),
        }
    }

    fn send_action(&mut self, action: ActionType, elems: Vec<Node>) {
        self.next_stanza_id += 1;
        let stanza = SessionStanzaBuilder::new(action, self.protocol, &self.id)
            .to(self.remote_name.as_str())
            .id(format!("{}-{}", self.id.id, self.next_stanza_id))
            .children(elems)
            .build();
        debug!(target: "Session", "{} sending {}", self.id, DisplayableNode(&stanza));
        self.events.push_back(SessionEvent::OutgoingMessage(stanza));
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("error", &self.error)
            .field("protocol", &self.protocol)
            .field("initiator", &self.initiator)
            .field("remote_name", &self.remote_name)
            .field("negotiator", &self.negotiator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::{MemoryTransport, MemoryTransportHandle};
    use jingle_core::constants::*;
    use jingle_core::media::{AudioCodec, AudioContentDescription, MediaContentParser};
    use jingle_core::xml::NodeBuilder;

    const ALICE: &str = "alice@example.com/phone";
    const BOB: &str = "bob@example.com/laptop";

    fn session(local: &str) -> (Session, MemoryTransportHandle) {
        let (transport, handle) = MemoryTransport::new();
        let mut parsers = ContentParserMap::new();
        MediaContentParser::new().register(&mut parsers);
        let session = Session::new(
            SessionId::new("1", ALICE),
            local,
            NS_GINGLE_AUDIO,
            Box::new(transport),
        )
        .with_content_parsers(parsers);
        (session, handle)
    }

    fn audio() -> SessionDescription {
        let mut description = SessionDescription::new();
        description.add_content(
            CN_AUDIO,
            NS_GINGLE_AUDIO,
            AudioContentDescription {
                codecs: vec![AudioCodec::new(0, "PCMU", 8000, 64000, 1)],
                ssrc: None,
            },
        );
        description
    }

    fn incoming(session: &Session, action: ActionType, children: Vec<Node>) -> Node {
        let builder = SessionStanzaBuilder::new(action, SignalingProtocol::Gingle2, session.id());
        let mut stanza = builder
            .to(session.local_name())
            .id("remote-1")
            .children(children)
            .build();
        let from = if session.local_name() == ALICE { BOB } else { ALICE };
        stanza.attrs.insert(ATTR_FROM.to_string(), from.to_string());
        stanza
    }

    fn payload(session: &Session, action: ActionType) -> Vec<Node> {
        match action {
            ActionType::SessionInitiate => SessionInitiate::new(NS_GINGLE_P2P, audio().contents)
                .write(&session.content_parsers, SignalingProtocol::Gingle2)
                .unwrap(),
            ActionType::SessionAccept => SessionAccept::new(audio().contents)
                .write(&session.content_parsers, SignalingProtocol::Gingle2)
                .unwrap(),
            ActionType::SessionTerminate => SessionTerminate::new("success").write(),
            ActionType::TransportInfo => TransportInfo::new(
                NS_GINGLE_P2P,
                vec![Candidate::new(CN_RTP, "10.0.0.2", 5000)],
            )
            .write(&session.transport_parsers, SignalingProtocol::Gingle2)
            .unwrap(),
            _ => Vec::new(),
        }
    }

    fn deliver(session: &mut Session, stanza: &Node) {
        let msg = parse_session_message(stanza).unwrap();
        session.on_incoming_message(&msg);
    }

    fn sent_actions(events: &[SessionEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::OutgoingMessage(stanza) => stanza
                    .get_child(NS_GINGLE, LN_SESSION)
                    .and_then(|s| s.attr(ATTR_TYPE))
                    .map(str::to_string),
                _ => None,
            })
            .collect()
    }

    fn error_replies(events: &[SessionEvent]) -> Vec<StanzaErrorCondition> {
        events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::ErrorMessage { condition, error_type, .. } => {
                    assert_eq!(error_type, ERROR_TYPE_MODIFY);
                    Some(*condition)
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_inbound_dispatch_follows_transition_table() {
        let cases = [
            (ActionType::SessionInitiate, (State::Init, State::ReceivedInitiate)),
            (ActionType::SessionAccept, (State::SentInitiate, State::ReceivedAccept)),
            (ActionType::SessionReject, (State::SentInitiate, State::ReceivedReject)),
        ];

        for (action, (legal_from, legal_to)) in cases {
            for state in State::ALL {
                let (mut session, _handle) = session(BOB);
                session.state = state;
                let stanza = incoming(&session, action, payload(&session, action));
                deliver(&mut session, &stanza);
                let events = session.drain_events();

                if state == legal_from {
                    assert_eq!(session.state(), legal_to, "{action} in {state}");
                    assert!(error_replies(&events).is_empty());
                } else {
                    assert_eq!(session.state(), state, "{action} in {state}");
                    assert_eq!(
                        error_replies(&events),
                        vec![StanzaErrorCondition::NotAllowed]
                    );
                }
            }
        }
    }

    #[test]
    fn test_terminate_accepted_in_every_live_state() {
        let reason = SessionEvent::TerminateReason("success".to_string());
        for state in State::ALL {
            let (mut session, _handle) = session(BOB);
            session.state = state;
            let terminate = payload(&session, ActionType::SessionTerminate);
            let stanza = incoming(&session, ActionType::SessionTerminate, terminate);
            deliver(&mut session, &stanza);
            let events = session.drain_events();

            if state == State::Deinit {
                assert_eq!(session.state(), State::Deinit);
                assert_eq!(error_replies(&events), vec![StanzaErrorCondition::NotAllowed]);
                assert!(!events.contains(&reason));
            } else {
                assert_eq!(session.state(), State::ReceivedTerminate, "{state}");
                assert!(events.contains(&reason));
            }
        }
    }

    #[test]
    fn test_accept_deferred_until_transport_negotiated() {
        let (mut session, _handle) = session(BOB);
        session.remote_name = ALICE.to_string();
        session.transition(SessionTransition::ReceiveInitiate).unwrap();
        session.drain_events();

        session.accept(audio()).unwrap();
        assert_eq!(session.state(), State::ReceivedInitiate);
        assert!(sent_actions(&session.drain_events()).is_empty());
        assert!(session.local_description().is_some());

        let candidates = payload(&session, ActionType::TransportInfo);
        let info = incoming(&session, ActionType::TransportInfo, candidates.clone());
        deliver(&mut session, &info);
        assert_eq!(session.state(), State::SentAccept);
        assert_eq!(sent_actions(&session.drain_events()), vec![GINGLE_ACTION_ACCEPT]);

        let again = incoming(&session, ActionType::TransportInfo, candidates);
        deliver(&mut session, &again);
        assert!(sent_actions(&session.drain_events()).is_empty());

        session.process_tasks();
        assert_eq!(session.state(), State::InProgress);
    }

    #[test]
    fn test_failed_initiate_write_has_no_side_effects() {
        let (mut session, _handle) = session(ALICE);
        let err = session.initiate(BOB, SessionDescription::new()).unwrap_err();
        assert!(matches!(err, SessionError::Write(_)));
        assert_eq!(session.state(), State::Init);
        assert!(session.remote_name().is_empty());
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn test_illegal_operations_are_refused() {
        let (mut session, _handle) = session(ALICE);
        assert!(matches!(session.accept(audio()), Err(SessionError::InvalidTransition(_))));
        assert!(session.reject().is_err());
        assert!(session.drain_events().is_empty());

        session.initiate(BOB, audio()).unwrap();
        assert!(session.initiate(BOB, audio()).is_err());
    }

    #[test]
    fn test_error_reply_ends_session_unless_retryable() {
        for (error_type, fatal) in [
            (ERROR_TYPE_CANCEL, true),
            (ERROR_TYPE_MODIFY, true),
            (ERROR_TYPE_WAIT, false),
            (ERROR_TYPE_CONTINUE, false),
        ] {
            let (mut session, _handle) = session(ALICE);
            session.initiate(BOB, audio()).unwrap();
            let initiate = match session.drain_events().remove(0) {
                SessionEvent::OutgoingMessage(stanza) => stanza,
                other => panic!("unexpected event {other:?}"),
            };
            let reply = jingle_core::messages::build_error_response(
                &initiate,
                StanzaErrorCondition::BadRequest,
                error_type,
                "",
            );

            session.on_failed_send(&initiate, &reply);
            session.process_tasks();
            if fatal {
                assert_eq!(session.error(), ErrorCode::Response);
                assert_eq!(session.state(), State::SentTerminate);
                let events = session.drain_events();
                assert!(sent_actions(&events).contains(&GINGLE_ACTION_TERMINATE.to_string()));
                assert!(events.contains(&SessionEvent::DestroyRequested));
            } else {
                assert_eq!(session.error(), ErrorCode::None, "{error_type}");
                assert_eq!(session.state(), State::SentInitiate);
            }
        }
    }

    #[test]
    fn test_candidate_error_goes_to_transport() {
        let (mut session, handle) = session(ALICE);
        session.initiate(BOB, audio()).unwrap();
        handle.candidates_ready(vec![Candidate::new(CN_RTP, "10.0.0.1", 4000)]);
        session.process_tasks();
        let candidates = session
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::OutgoingMessage(stanza) => Some(stanza),
                _ => None,
            })
            .next_back()
            .unwrap();

        let mut reply = jingle_core::messages::build_error_response(
            &candidates,
            StanzaErrorCondition::NotAcceptable,
            ERROR_TYPE_CANCEL,
            "",
        );
        let error = NodeBuilder::new(LN_ERROR)
            .attr(ATTR_TYPE, ERROR_TYPE_CANCEL)
            .children([
                NodeBuilder::new("unknown-channel-name").ns(NS_GINGLE_P2P).build(),
                NodeBuilder::new("bad-request").ns(NS_STANZA_ERRORS).build(),
            ])
            .build();
        reply.content = Some(jingle_core::xml::NodeContent::Nodes(vec![error]));

        session.on_failed_send(&candidates, &reply);
        session.process_tasks();
        assert_eq!(session.error(), ErrorCode::None);
        assert_eq!(session.state(), State::SentInitiate);
        let errors = handle.transport_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].tag, "unknown-channel-name");
    }

    #[test]
    fn test_watchdog_times_out_unwritable_transport() {
        let (mut session, handle) = session(ALICE);
        session.initiate(BOB, audio()).unwrap();
        session.create_channel(NS_GINGLE_AUDIO, CN_RTP);
        assert_eq!(session.poll_timeout(), None);

        handle.signal_connecting();
        session.process_tasks();
        let deadline = session.poll_timeout().unwrap();

        session.handle_timeout(deadline - Duration::from_secs(1));
        assert_eq!(session.error(), ErrorCode::None);

        session.handle_timeout(deadline);
        assert_eq!(session.poll_timeout(), None);
        session.process_tasks();
        assert_eq!(session.error(), ErrorCode::Timeout);
        assert_eq!(session.state(), State::SentTerminate);
    }

    #[test]
    fn test_writable_transport_cancels_watchdog() {
        let (mut session, handle) = session(ALICE);
        session.initiate(BOB, audio()).unwrap();
        session.create_channel(NS_GINGLE_AUDIO, CN_RTP);
        handle.signal_connecting();
        session.process_tasks();
        assert!(session.poll_timeout().is_some());

        handle.set_writable(true);
        session.process_tasks();
        assert_eq!(session.poll_timeout(), None);
    }

    #[test]
    fn test_state_ticks_observed_in_order() {
        let (mut session, _handle) = session(BOB);
        let offer = payload(&session, ActionType::SessionInitiate);
        let initiate = incoming(&session, ActionType::SessionInitiate, offer);
        deliver(&mut session, &initiate);
        session.reject().unwrap();
        session.process_tasks();

        let states: Vec<State> = session
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged(state) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![State::ReceivedInitiate, State::SentReject, State::SentTerminate]
        );
    }

    #[test]
    fn test_reject_does_not_send_terminate() {
        let (mut session, _handle) = session(BOB);
        let offer = payload(&session, ActionType::SessionInitiate);
        let initiate = incoming(&session, ActionType::SessionInitiate, offer);
        deliver(&mut session, &initiate);
        session.reject().unwrap();
        session.process_tasks();

        let events = session.drain_events();
        assert_eq!(sent_actions(&events), vec![GINGLE_ACTION_REJECT]);
        assert!(events.contains(&SessionEvent::DestroyRequested));
    }

    #[test]
    fn test_initiate_with_unknown_transport_not_acceptable() {
        let (mut session, _handle) = session(BOB);
        let children = SessionInitiate::new(NS_GINGLE_RAW, audio().contents)
            .write(&session.content_parsers, SignalingProtocol::Gingle2)
            .unwrap();
        let initiate = incoming(&session, ActionType::SessionInitiate, children);
        deliver(&mut session, &initiate);

        assert_eq!(session.state(), State::Init);
        assert_eq!(
            error_replies(&session.drain_events()),
            vec![StanzaErrorCondition::NotAcceptable]
        );
    }

    #[test]
    fn test_info_forwarded_and_acknowledged_in_any_state() {
        let payload = NodeBuilder::new("ring")
            .ns("urn:example:phone")
            .attr("volume", "3")
            .build();

        for state in [State::Init, State::SentInitiate, State::InProgress, State::SentTerminate] {
            let (mut session, _handle) = session(BOB);
            session.state = state;
            let info = incoming(&session, ActionType::SessionInfo, vec![payload.clone()]);
            deliver(&mut session, &info);

            assert_eq!(session.state(), state);
            let events = session.drain_events();
            assert_eq!(events.len(), 2, "{state}");
            assert_eq!(events[0], SessionEvent::InfoMessage(vec![payload.clone()]));
            match &events[1] {
                SessionEvent::OutgoingMessage(ack) => {
                    assert_eq!(ack.attr(ATTR_TYPE), Some(IQ_TYPE_RESULT));
                    assert_eq!(ack.attr(ATTR_ID), Some("remote-1"));
                }
                other => panic!("expected an ack in {state}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_deinit_destroys_channels() {
        let (mut session, handle) = session(ALICE);
        session.initiate(BOB, audio()).unwrap();
        session.create_channel(NS_GINGLE_AUDIO, CN_RTP);
        assert_eq!(handle.channel_names(), vec![CN_RTP]);

        session.deinit();
        assert_eq!(session.state(), State::Deinit);
        assert!(handle.channel_names().is_empty());
        assert!(session.terminate().is_err());
    }
}
