//! An in-process transport that never touches the network.
//!
//! Every call the session makes is recorded, and a [`MemoryTransportHandle`]
//! lets the owner inject the events a real transport would raise. The
//! loopback binary and the test suites drive sessions through it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use jingle_core::constants::NS_GINGLE_P2P;
use jingle_core::p2p::P2pTransportParser;
use jingle_core::xml::Node;
use jingle_core::{Candidate, SessionId, StanzaErrorCondition, TransportParser};
use log::debug;

use super::{
    ChannelImpl, Transport, TransportChannel, TransportEvent, TransportFactory, TransportWaker,
};

#[derive(Debug)]
struct MemoryChannel {
    name: String,
    content_type: String,
    writable: Arc<AtomicBool>,
}

impl TransportChannel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    channels: IndexMap<String, Arc<MemoryChannel>>,
    /// Every channel name passed to `create_channel`, in call order.
    created: Vec<String>,
    connect_calls: usize,
    remote_candidates: Vec<Candidate>,
    transport_errors: Vec<Node>,
    events: VecDeque<TransportEvent>,
}

#[derive(Debug, Clone)]
struct Shared {
    writable: Arc<AtomicBool>,
    state: Arc<Mutex<MemoryState>>,
    waker: TransportWaker,
}

impl Shared {
    fn new(waker: TransportWaker) -> Self {
        Self {
            writable: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(MemoryState::default())),
            waker,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A transport whose connectivity is scripted through a
/// [`MemoryTransportHandle`].
#[derive(Debug)]
pub struct MemoryTransport {
    name: String,
    shared: Shared,
}

impl MemoryTransport {
    /// A transport speaking the p2p transport namespace.
    pub fn new() -> (Self, MemoryTransportHandle) {
        Self::with_waker(NS_GINGLE_P2P, TransportWaker::new())
    }

    pub fn with_waker(
        name: impl Into<String>,
        waker: TransportWaker,
    ) -> (Self, MemoryTransportHandle) {
        let shared = Shared::new(waker);
        let handle = MemoryTransportHandle {
            shared: shared.clone(),
        };
        (
            Self {
                name: name.into(),
                shared,
            },
            handle,
        )
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn parser(&self) -> Arc<dyn TransportParser> {
        Arc::new(P2pTransportParser::new())
    }

    fn create_channel(&mut self, name: &str, content_type: &str) -> ChannelImpl {
        let mut state = self.shared.lock();
        state.created.push(name.to_string());
        let channel = Arc::new(MemoryChannel {
            name: name.to_string(),
            content_type: content_type.to_string(),
            writable: self.shared.writable.clone(),
        });
        state.channels.insert(name.to_string(), channel.clone());
        channel
    }

    fn get_channel(&self, name: &str) -> Option<ChannelImpl> {
        self.shared
            .lock()
            .channels
            .get(name)
            .map(|c| c.clone() as ChannelImpl)
    }

    fn has_channels(&self) -> bool {
        !self.shared.lock().channels.is_empty()
    }

    fn destroy_channel(&mut self, name: &str) {
        self.shared.lock().channels.shift_remove(name);
    }

    fn writable(&self) -> bool {
        self.shared.writable.load(Ordering::SeqCst)
    }

    fn connect_channels(&mut self) {
        let mut state = self.shared.lock();
        state.connect_calls += 1;
        debug!("memory transport connecting {} channel(s)", state.channels.len());
    }

    fn on_remote_candidates(&mut self, candidates: &[Candidate]) {
        self.shared
            .lock()
            .remote_candidates
            .extend_from_slice(candidates);
    }

    fn on_transport_error(&mut self, error: &Node) {
        self.shared.lock().transport_errors.push(error.clone());
    }

    fn poll_event(&mut self) -> Option<TransportEvent> {
        self.shared.lock().events.pop_front()
    }
}

/// Scripting and inspection side of a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryTransportHandle {
    shared: Shared,
}

impl MemoryTransportHandle {
    fn push(&self, event: TransportEvent) {
        self.shared.lock().events.push_back(event);
        self.shared.waker.wake();
    }

    pub fn signal_connecting(&self) {
        self.push(TransportEvent::Connecting);
    }

    pub fn set_writable(&self, writable: bool) {
        self.shared.writable.store(writable, Ordering::SeqCst);
        self.push(TransportEvent::WritableChanged);
    }

    pub fn candidates_ready(&self, candidates: Vec<Candidate>) {
        self.push(TransportEvent::CandidatesReady(candidates));
    }

    pub fn channel_gone(&self, name: impl Into<String>) {
        let name = name.into();
        self.shared.lock().channels.shift_remove(&name);
        self.push(TransportEvent::ChannelGone(name));
    }

    pub fn send_error(
        &self,
        stanza: Node,
        condition: StanzaErrorCondition,
        error_type: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.push(TransportEvent::SendError {
            stanza,
            condition,
            error_type: error_type.into(),
            text: text.into(),
        });
    }

    pub fn fail(&self, reason: impl Into<String>) {
        self.push(TransportEvent::Failed(reason.into()));
    }

    /// Names of the channel implementations that currently exist.
    pub fn channel_names(&self) -> Vec<String> {
        self.shared.lock().channels.keys().cloned().collect()
    }

    /// Every `create_channel` call so far, including destroyed channels.
    pub fn created_channels(&self) -> Vec<String> {
        self.shared.lock().created.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.shared.lock().connect_calls
    }

    pub fn remote_candidates(&self) -> Vec<Candidate> {
        self.shared.lock().remote_candidates.clone()
    }

    pub fn transport_errors(&self) -> Vec<Node> {
        self.shared.lock().transport_errors.clone()
    }
}

/// Hands out [`MemoryTransport`]s and keeps their handles by session.
#[derive(Debug, Default)]
pub struct MemoryTransportFactory {
    handles: Mutex<HashMap<SessionId, MemoryTransportHandle>>,
}

impl MemoryTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, session_id: &SessionId) -> Option<MemoryTransportHandle> {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn create_transport(
        &self,
        session_id: &SessionId,
        waker: TransportWaker,
    ) -> Box<dyn Transport> {
        let (transport, handle) = MemoryTransport::with_waker(NS_GINGLE_P2P, waker);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id.clone(), handle);
        Box::new(transport)
    }
}
