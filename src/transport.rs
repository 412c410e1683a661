//! The seam between a session and the connectivity layer underneath it.
//!
//! A session never touches sockets. It asks its [`Transport`] for channels,
//! forwards remote candidates to it, and polls it for [`TransportEvent`]s
//! when it processes work. Candidate gathering, connectivity checks and
//! relaying all live behind this trait. A transport raises its
//! [`TransportWaker`] whenever it queues an event, so whoever drives the
//! session knows to process it.

use std::fmt;
use std::sync::Arc;

use jingle_core::xml::Node;
use jingle_core::{Candidate, SessionId, StanzaErrorCondition, TransportParser};
use tokio::sync::Notify;

pub mod memory;

/// A connected datagram path for one channel, owned by the transport.
pub trait TransportChannel: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn content_type(&self) -> &str;
    fn writable(&self) -> bool;
}

pub type ChannelImpl = Arc<dyn TransportChannel>;

/// Something the transport wants the owning session to know about.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connectivity checks have started.
    Connecting,
    /// The writability of at least one channel changed.
    WritableChanged,
    /// Local candidates were gathered and should be signaled to the peer.
    CandidatesReady(Vec<Candidate>),
    /// A transport-level error reply should be sent for `stanza`.
    SendError {
        stanza: Node,
        condition: StanzaErrorCondition,
        error_type: String,
        text: String,
    },
    /// The transport lost the channel implementation named here.
    ChannelGone(String),
    /// Unrecoverable failure such as a resource allocation error.
    Failed(String),
}

/// Connectivity provider for one session.
///
/// Channel implementations are keyed by name. The session calls
/// [`create_channel`](Transport::create_channel) at most once per name while
/// the channel exists.
pub trait Transport: Send {
    /// Namespace identifying this transport on the wire.
    fn name(&self) -> &str;

    fn parser(&self) -> Arc<dyn TransportParser>;

    fn create_channel(&mut self, name: &str, content_type: &str) -> ChannelImpl;

    fn get_channel(&self, name: &str) -> Option<ChannelImpl>;

    fn has_channel(&self, name: &str) -> bool {
        self.get_channel(name).is_some()
    }

    fn has_channels(&self) -> bool;

    fn destroy_channel(&mut self, name: &str);

    /// Whether every channel can currently send.
    fn writable(&self) -> bool;

    /// Starts connectivity checks on every channel created so far.
    fn connect_channels(&mut self);

    fn on_remote_candidates(&mut self, candidates: &[Candidate]);

    /// Receives an error child, in this transport's namespace, of an error
    /// reply to one of the session's candidate messages.
    fn on_transport_error(&mut self, error: &Node);

    fn poll_event(&mut self) -> Option<TransportEvent>;
}

/// Signals that some transport has an event waiting in
/// [`poll_event`](Transport::poll_event). Shared by every transport of a
/// manager; a wake with nobody waiting is kept until the next wait.
#[derive(Debug, Clone, Default)]
pub struct TransportWaker(Arc<Notify>);

impl TransportWaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        self.0.notify_one();
    }

    /// Completes once [`wake`](Self::wake) has been called.
    pub async fn woken(&self) {
        self.0.notified().await;
    }
}

/// Builds a fresh transport for every session the manager creates.
pub trait TransportFactory: Send + Sync {
    /// The returned transport must call `waker.wake()` after queuing an event.
    fn create_transport(
        &self,
        session_id: &SessionId,
        waker: TransportWaker,
    ) -> Box<dyn Transport>;
}
