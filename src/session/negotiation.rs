//! Channel proxies and the transport negotiation latch.
//!
//! The application may create channels before anyone knows which transport
//! the peers will agree on. Each channel is handed out as a
//! [`TransportChannelProxy`] that binds to a real implementation only once
//! negotiation completes; until then candidates we signal are kept so they can
//! be resent if the peer turns out to need a different dialect.

use std::mem;

use indexmap::IndexMap;
use jingle_core::Candidate;
use log::warn;

use crate::transport::{ChannelImpl, Transport};

/// Stable handle the application holds for a named channel.
#[derive(Debug, Clone)]
pub struct TransportChannelProxy {
    name: String,
    content_type: String,
    implementation: Option<ChannelImpl>,
}

impl TransportChannelProxy {
    fn new(name: &str, content_type: &str) -> Self {
        Self {
            name: name.to_string(),
            content_type: content_type.to_string(),
            implementation: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn implementation(&self) -> Option<&ChannelImpl> {
        self.implementation.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.implementation.is_some()
    }

    /// An unbound proxy is never writable.
    pub fn writable(&self) -> bool {
        self.implementation.as_ref().is_some_and(|i| i.writable())
    }
}

#[derive(Debug)]
enum Negotiation {
    Pending { sent_candidates: Vec<Candidate> },
    Negotiated,
}

fn fetch_or_create(transport: &mut dyn Transport, name: &str, content_type: &str) -> ChannelImpl {
    match transport.get_channel(name) {
        Some(existing) => existing,
        None => transport.create_channel(name, content_type),
    }
}

/// Owns a session's transport and the proxies bound to it.
pub struct TransportNegotiator {
    transport: Box<dyn Transport>,
    channels: IndexMap<String, TransportChannelProxy>,
    negotiation: Negotiation,
}

impl TransportNegotiator {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            channels: IndexMap::new(),
            negotiation: Negotiation::Pending {
                sent_candidates: Vec::new(),
            },
        }
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn is_negotiated(&self) -> bool {
        matches!(self.negotiation, Negotiation::Negotiated)
    }

    /// Registers a channel proxy. Once negotiated the proxy is bound
    /// immediately; before that, `preconnect` creates the implementation
    /// speculatively so connectivity checks can start early, leaving the
    /// proxy unbound.
    pub fn create_channel(
        &mut self,
        name: &str,
        content_type: &str,
        preconnect: bool,
    ) -> &TransportChannelProxy {
        if self.channels.contains_key(name) {
            warn!(target: "Session", "channel {name} already exists");
        } else {
            let mut proxy = TransportChannelProxy::new(name, content_type);
            if self.is_negotiated() {
                proxy.implementation = Some(fetch_or_create(
                    self.transport.as_mut(),
                    name,
                    content_type,
                ));
            } else if preconnect {
                fetch_or_create(self.transport.as_mut(), name, content_type);
            }
            self.channels.insert(name.to_string(), proxy);
        }
        &self.channels[name]
    }

    pub fn get_channel(&self, name: &str) -> Option<&TransportChannelProxy> {
        self.channels.get(name)
    }

    pub fn channels(&self) -> impl Iterator<Item = &TransportChannelProxy> {
        self.channels.values()
    }

    /// Unbinds and forgets the proxy, destroying its implementation if the
    /// transport still has one.
    pub fn destroy_channel(&mut self, name: &str) -> Option<TransportChannelProxy> {
        let mut proxy = self.channels.shift_remove(name)?;
        proxy.implementation = None;
        if self.transport.has_channel(name) {
            self.transport.destroy_channel(name);
        }
        Some(proxy)
    }

    pub fn destroy_all_channels(&mut self) {
        for (name, _) in self.channels.drain(..) {
            if self.transport.has_channel(&name) {
                self.transport.destroy_channel(&name);
            }
        }
    }

    /// Drops the binding of a proxy whose implementation the transport lost.
    /// Returns whether such a proxy existed.
    pub fn unbind_channel(&mut self, name: &str) -> bool {
        match self.channels.get_mut(name) {
            Some(proxy) => {
                proxy.implementation = None;
                true
            }
            None => false,
        }
    }

    /// Ensures an implementation exists for every known channel and starts
    /// connectivity checks, without binding anything.
    pub fn connect_default_channels(&mut self) {
        for proxy in self.channels.values() {
            fetch_or_create(self.transport.as_mut(), &proxy.name, &proxy.content_type);
        }
        self.transport.connect_channels();
    }

    fn connect_transport_channels(&mut self) {
        for proxy in self.channels.values_mut() {
            let implementation =
                fetch_or_create(self.transport.as_mut(), &proxy.name, &proxy.content_type);
            proxy.implementation = Some(implementation);
        }
        self.transport.connect_channels();
    }

    /// Latches negotiation, binding every proxy. Returns `false` if the
    /// transport was already negotiated; the latch never resets.
    pub fn negotiate(&mut self) -> bool {
        if self.is_negotiated() {
            return false;
        }
        self.negotiation = Negotiation::Negotiated;
        self.connect_transport_channels();
        true
    }

    /// Remembers candidates sent while negotiation is pending.
    pub fn buffer_candidates(&mut self, candidates: &[Candidate]) {
        if let Negotiation::Pending { sent_candidates } = &mut self.negotiation {
            sent_candidates.extend_from_slice(candidates);
        }
    }

    pub fn sent_candidates(&self) -> &[Candidate] {
        match &self.negotiation {
            Negotiation::Pending { sent_candidates } => sent_candidates,
            Negotiation::Negotiated => &[],
        }
    }

    /// Empties the buffer for a resend.
    pub fn take_sent_candidates(&mut self) -> Vec<Candidate> {
        match &mut self.negotiation {
            Negotiation::Pending { sent_candidates } => mem::take(sent_candidates),
            Negotiation::Negotiated => Vec::new(),
        }
    }

    pub fn has_channels(&self) -> bool {
        self.transport.has_channels()
    }

    pub fn writable(&self) -> bool {
        self.transport.writable()
    }
}

impl std::fmt::Debug for TransportNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportNegotiator")
            .field("transport", &self.transport.name())
            .field("channels", &self.channels.keys().collect::<Vec<_>>())
            .field("negotiation", &self.negotiation)
            .finish()
    }
}
