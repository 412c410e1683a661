//! Owns every session of one local endpoint and routes stanzas to them.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use jingle_core::constants::{
    ATTR_ID, ATTR_TYPE, ERROR_TYPE_CANCEL, ERROR_TYPE_MODIFY, IQ_TYPE_ERROR, IQ_TYPE_RESULT,
    IQ_TYPE_SET,
};
use jingle_core::messages::{
    build_error_response, is_session_message, parse_first_content_type, parse_session_message,
};
use jingle_core::xml::{DisplayableNode, Node};
use jingle_core::{ActionType, ContentParserMap, SessionId, StanzaErrorCondition};
use log::{debug, info, warn};
use tokio::time::Instant;

use crate::client::SessionClient;
use crate::config::SessionManagerConfig;
use crate::events::EventBus;
use crate::session::{Session, SessionError, SessionEvent, State};
use crate::transport::{TransportFactory, TransportWaker};

/// An outgoing `set` stanza awaiting its result or error reply.
#[derive(Debug, Clone)]
struct PendingStanza {
    session_id: SessionId,
    stanza: Node,
}

pub struct SessionManager {
    local_name: String,
    config: SessionManagerConfig,
    transport_factory: Arc<dyn TransportFactory>,
    transport_waker: TransportWaker,
    clients: HashMap<String, Arc<dyn SessionClient>>,
    sessions: BTreeMap<SessionId, Session>,
    pending: HashMap<String, PendingStanza>,
    outgoing: VecDeque<Node>,
    event_bus: Arc<EventBus>,
}

impl SessionManager {
    pub fn new(
        local_name: impl Into<String>,
        config: SessionManagerConfig,
        transport_factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::with_capacity(config.event_capacity));
        Self {
            local_name: local_name.into(),
            config,
            transport_factory,
            transport_waker: TransportWaker::new(),
            clients: HashMap::new(),
            sessions: BTreeMap::new(),
            pending: HashMap::new(),
            outgoing: VecDeque::new(),
            event_bus,
        }
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn config(&self) -> &SessionManagerConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Raised by any session's transport when it has an event to process.
    pub fn transport_waker(&self) -> &TransportWaker {
        &self.transport_waker
    }

    /// Registers `client` for every content type it serves, replacing any
    /// earlier client for those types.
    pub fn add_client(&mut self, client: Arc<dyn SessionClient>) {
        for content_type in client.content_types() {
            self.clients.insert(content_type, client.clone());
        }
    }

    pub fn remove_client(&mut self, content_type: &str) -> Option<Arc<dyn SessionClient>> {
        self.clients.remove(content_type)
    }

    fn content_parsers(&self) -> ContentParserMap {
        self.clients
            .iter()
            .map(|(content_type, client)| (content_type.clone(), client.content_parser()))
            .collect()
    }

    /// Creates an outgoing session of `content_type` with a fresh random id.
    pub fn create_session(&mut self, content_type: &str) -> Result<SessionId, SessionError> {
        if !self.clients.contains_key(content_type) {
            return Err(SessionError::UnknownContentType(content_type.to_string()));
        }
        let mut id = SessionId::new(generate_session_id(), self.local_name.as_str());
        while self.sessions.contains_key(&id) {
            id.id = generate_session_id();
        }
        self.insert_session(id.clone(), content_type, false);
        Ok(id)
    }

    fn insert_session(&mut self, id: SessionId, content_type: &str, received_initiate: bool) {
        let transport = self
            .transport_factory
            .create_transport(&id, self.transport_waker.clone());
        let local_name = self.local_name.as_str();
        let mut session = Session::new(id.clone(), local_name, content_type, transport)
            .with_protocol(self.config.initial_protocol)
            .with_session_timeout(self.config.session_timeout())
            .with_content_parsers(self.content_parsers());
        if let Some(client) = self.clients.get(content_type) {
            session = session.with_client(client.clone());
            client.on_session_create(&id, received_initiate);
        }
        info!(target: "SessionManager", "Created session {id} ({content_type})");
        self.sessions.insert(id.clone(), session);
        let _ = self.event_bus.session_created.send(Arc::new(id));
    }

    pub fn session(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn session_mut(&mut self, id: &SessionId) -> Result<&mut Session, SessionError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Tears the session down and forgets it.
    pub fn destroy_session(&mut self, id: &SessionId) -> bool {
        let Some(mut session) = self.sessions.remove(id) else {
            return false;
        };
        session.deinit();
        for event in session.drain_events() {
            self.event_bus.publish(id, &event);
        }
        self.pending.retain(|_, p| &p.session_id != id);
        if let Some(client) = self.clients.get(session.content_type()) {
            client.on_session_destroy(id);
        }
        info!(target: "SessionManager", "Destroyed session {id}");
        let _ = self.event_bus.session_destroyed.send(Arc::new(id.clone()));
        true
    }

    /// Routes one inbound stanza: replies to our own requests, then session
    /// messages. Anything else is ignored.
    pub fn on_incoming_stanza(&mut self, stanza: &Node) {
        match stanza.attr(ATTR_TYPE) {
            Some(IQ_TYPE_RESULT) => {
                if let Some(id) = stanza.attr(ATTR_ID) {
                    self.pending.remove(id);
                }
                return;
            }
            Some(IQ_TYPE_ERROR) => {
                self.on_error_reply(stanza);
                return;
            }
            _ => {}
        }

        if !is_session_message(stanza) {
            debug!(target: "SessionManager", "Ignoring stanza {}", DisplayableNode(stanza));
            return;
        }
        let msg = match parse_session_message(stanza) {
            Ok(msg) => msg,
            Err(e) => {
                self.reply_error(
                    stanza,
                    StanzaErrorCondition::BadRequest,
                    ERROR_TYPE_MODIFY,
                    &e.to_string(),
                );
                return;
            }
        };

        let session_id = msg.session_id();
        let mut created = false;
        match self.sessions.get(&session_id) {
            Some(session) => {
                if !session.remote_name().is_empty() && session.remote_name() != msg.from {
                    warn!(
                        target: "SessionManager",
                        "{} from {} but session belongs to {}",
                        session_id,
                        msg.from,
                        session.remote_name()
                    );
                    self.reply_unknown_session(stanza);
                    return;
                }
            }
            None if msg.action == ActionType::SessionInitiate => {
                let content_type = match parse_first_content_type(msg.action_elem) {
                    Ok(content_type) => content_type.to_string(),
                    Err(e) => {
                        self.reply_error(
                            stanza,
                            StanzaErrorCondition::BadRequest,
                            ERROR_TYPE_MODIFY,
                            &e.to_string(),
                        );
                        return;
                    }
                };
                if !self.clients.contains_key(&content_type) {
                    self.reply_error(
                        stanza,
                        StanzaErrorCondition::BadRequest,
                        ERROR_TYPE_CANCEL,
                        &format!("unknown content type: {content_type}"),
                    );
                    return;
                }
                self.insert_session(session_id.clone(), &content_type, true);
                created = true;
            }
            None => {
                self.reply_unknown_session(stanza);
                return;
            }
        }

        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };
        session.on_incoming_message(&msg);

        // A session that refused its own offer would sit in Init forever.
        if created && session.state() == State::Init {
            debug!(target: "SessionManager", "Offer for {session_id} refused, dropping session");
            self.process_session(&session_id);
            self.destroy_session(&session_id);
        }
    }

    fn on_error_reply(&mut self, stanza: &Node) {
        let Some(pending) = stanza.attr(ATTR_ID).and_then(|id| self.pending.remove(id)) else {
            debug!(
                target: "SessionManager",
                "Error reply to unknown request {}",
                DisplayableNode(stanza)
            );
            return;
        };
        if let Some(session) = self.sessions.get_mut(&pending.session_id) {
            session.on_failed_send(&pending.stanza, stanza);
        }
    }

    fn reply_unknown_session(&mut self, original: &Node) {
        self.reply_error(
            original,
            StanzaErrorCondition::ItemNotFound,
            ERROR_TYPE_CANCEL,
            "unknown session",
        );
    }

    fn reply_error(
        &mut self,
        original: &Node,
        condition: StanzaErrorCondition,
        error_type: &str,
        text: &str,
    ) {
        warn!(
            target: "SessionManager",
            "Replying {} to {}: {}",
            condition,
            DisplayableNode(original),
            text
        );
        self.outgoing
            .push_back(build_error_response(original, condition, error_type, text));
    }

    /// Runs every session's pending work, collects their outgoing stanzas,
    /// publishes their events and destroys the sessions that asked for it.
    pub fn process(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        let to_destroy: Vec<SessionId> = ids
            .into_iter()
            .filter(|id| self.process_session(id))
            .collect();

        for id in to_destroy {
            self.destroy_session(&id);
        }
    }

    /// Runs one session's pending work and routes its events. Returns whether
    /// the session asked to be destroyed.
    fn process_session(&mut self, id: &SessionId) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            return false;
        };
        session.process_tasks();
        let mut destroy = false;
        for event in session.drain_events() {
            match &event {
                SessionEvent::OutgoingMessage(stanza) => {
                    if stanza.attr(ATTR_TYPE) == Some(IQ_TYPE_SET) {
                        if let Some(stanza_id) = stanza.attr(ATTR_ID) {
                            self.pending.insert(
                                stanza_id.to_string(),
                                PendingStanza {
                                    session_id: id.clone(),
                                    stanza: stanza.clone(),
                                },
                            );
                        }
                    }
                    self.outgoing.push_back(stanza.clone());
                }
                SessionEvent::ErrorMessage {
                    original,
                    condition,
                    error_type,
                    text,
                } => {
                    self.outgoing.push_back(build_error_response(
                        original, *condition, error_type, text,
                    ));
                }
                SessionEvent::DestroyRequested => destroy = true,
                _ => {}
            }
            self.event_bus.publish(id, &event);
        }
        destroy
    }

    /// Stanzas produced since the last call, in order.
    pub fn drain_outgoing(&mut self) -> Vec<Node> {
        self.outgoing.drain(..).collect()
    }

    /// Earliest watchdog deadline across all sessions.
    pub fn next_timeout(&self) -> Option<Instant> {
        self.sessions.values().filter_map(Session::poll_timeout).min()
    }

    pub fn handle_timeouts(&mut self, now: Instant) {
        for session in self.sessions.values_mut() {
            session.handle_timeout(now);
        }
        self.process();
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("local_name", &self.local_name)
            .field("config", &self.config)
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .field("sessions", &self.sessions.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn generate_session_id() -> String {
    rand::random::<u64>().to_string()
}
