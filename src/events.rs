use std::sync::Arc;

use jingle_core::SessionId;
use jingle_core::xml::Node;
use tokio::sync::broadcast;

use crate::session::{ErrorCode, SessionEvent, State};

// Default size of each broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 64;

macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per event type.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self::with_capacity(CHANNEL_CAPACITY)
            }

            pub fn with_capacity(capacity: usize) -> Self {
                Self {
                    $(
                        $field: broadcast::channel(capacity.max(1)).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Session lifecycle
    (session_created, Arc<SessionId>),
    (session_destroyed, Arc<SessionId>),
    (state_changed, Arc<(SessionId, State)>),
    (error_changed, Arc<(SessionId, ErrorCode)>),

    // Session content
    (info_message, Arc<(SessionId, Vec<Node>)>),
    (terminate_reason, Arc<(SessionId, String)>),
    (channel_gone, Arc<(SessionId, String)>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Fans a session event out to subscribers. Wire-level events are the
    /// manager's business and are not broadcast.
    pub fn publish(&self, session_id: &SessionId, event: &SessionEvent) {
        // A send only fails when nobody is subscribed.
        match event {
            SessionEvent::StateChanged(state) => {
                let _ = self
                    .state_changed
                    .send(Arc::new((session_id.clone(), *state)));
            }
            SessionEvent::ErrorChanged(error) => {
                let _ = self
                    .error_changed
                    .send(Arc::new((session_id.clone(), *error)));
            }
            SessionEvent::InfoMessage(payload) => {
                let _ = self
                    .info_message
                    .send(Arc::new((session_id.clone(), payload.clone())));
            }
            SessionEvent::TerminateReason(reason) => {
                let _ = self
                    .terminate_reason
                    .send(Arc::new((session_id.clone(), reason.clone())));
            }
            SessionEvent::ChannelGone(name) => {
                let _ = self
                    .channel_gone
                    .send(Arc::new((session_id.clone(), name.clone())));
            }
            SessionEvent::OutgoingMessage(_)
            | SessionEvent::ErrorMessage { .. }
            | SessionEvent::DestroyRequested => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_routes_by_event_type() {
        let bus = EventBus::new();
        let mut states = bus.state_changed.subscribe();
        let mut reasons = bus.terminate_reason.subscribe();
        let id = SessionId::new("1", "alice@example.com/phone");

        bus.publish(&id, &SessionEvent::StateChanged(State::SentInitiate));
        bus.publish(&id, &SessionEvent::TerminateReason("busy".to_string()));
        bus.publish(&id, &SessionEvent::DestroyRequested);

        assert_eq!(*states.try_recv().unwrap(), (id.clone(), State::SentInitiate));
        assert!(states.try_recv().is_err());
        assert_eq!(reasons.try_recv().unwrap().1, "busy");
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::with_capacity(0);
        bus.publish(
            &SessionId::new("1", "a"),
            &SessionEvent::ErrorChanged(ErrorCode::Timeout),
        );
    }
}
