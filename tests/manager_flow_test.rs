use std::sync::Arc;

use jingle_session::jingle_core::constants::*;
use jingle_session::jingle_core::media::{AudioCodec, MediaContentParser, VideoCodec};
use jingle_session::jingle_core::{
    ActionType, Candidate, ContentParserMap, SessionId, SessionInitiate, SessionStanzaBuilder,
    SignalingProtocol,
};
use jingle_session::transport::memory::MemoryTransportFactory;
use jingle_session::xml::Node;
use jingle_session::{MediaSessionClient, SessionManager, SessionManagerConfig, State};
use tokio::sync::broadcast::error::TryRecvError;

const ALICE: &str = "alice@example.com/phone";
const BOB: &str = "bob@example.com/laptop";

struct Endpoint {
    manager: SessionManager,
    transports: Arc<MemoryTransportFactory>,
}

fn endpoint(name: &str, protocol: SignalingProtocol, auto_accept: bool) -> Endpoint {
    let transports = Arc::new(MemoryTransportFactory::new());
    let config = SessionManagerConfig {
        initial_protocol: protocol,
        ..SessionManagerConfig::default()
    };
    let mut manager = SessionManager::new(name, config, transports.clone());
    manager.add_client(Arc::new(
        MediaSessionClient::new(
            vec![
                AudioCodec::new(103, "ISAC", 16000, 32000, 1),
                AudioCodec::new(0, "PCMU", 8000, 64000, 1),
            ],
            vec![VideoCodec::new(97, "H264", 320, 200, 30)],
        )
        .with_auto_accept(auto_accept),
    ));
    Endpoint {
        manager,
        transports,
    }
}

/// Delivers `stanza` to `to` the way a server would, stamping the sender.
fn deliver(from: &str, to: &mut Endpoint, mut stanza: Node) {
    stanza.attrs.insert(ATTR_FROM.to_string(), from.to_string());
    to.manager.on_incoming_stanza(&stanza);
}

/// Shuttles stanzas between the two endpoints until both go quiet.
/// Returns everything that crossed the wire.
fn pump(alice: &mut Endpoint, bob: &mut Endpoint) -> Vec<Node> {
    let mut wire = Vec::new();
    loop {
        alice.manager.process();
        bob.manager.process();
        let from_alice = alice.manager.drain_outgoing();
        let from_bob = bob.manager.drain_outgoing();
        if from_alice.is_empty() && from_bob.is_empty() {
            return wire;
        }
        for stanza in from_alice {
            deliver(ALICE, bob, stanza.clone());
            wire.push(stanza);
        }
        for stanza in from_bob {
            deliver(BOB, alice, stanza.clone());
            wire.push(stanza);
        }
    }
}

fn place_call(alice: &mut Endpoint, bob: &mut Endpoint) -> SessionId {
    let offer = MediaSessionClient::new(
        vec![AudioCodec::new(0, "PCMU", 8000, 64000, 1)],
        Vec::new(),
    )
    .create_offer(false);

    let id = alice.manager.create_session(NS_GINGLE_AUDIO).unwrap();
    let session = alice.manager.session_mut(&id).unwrap();
    session.initiate(BOB, offer).unwrap();
    session.create_channel(NS_GINGLE_AUDIO, CN_RTP);
    pump(alice, bob);

    bob.manager
        .session_mut(&id)
        .unwrap()
        .create_channel(NS_GINGLE_AUDIO, CN_RTP);

    for (endpoint, address) in [(&*alice, "10.0.0.1"), (&*bob, "10.0.0.2")] {
        endpoint
            .transports
            .handle(&id)
            .unwrap()
            .candidates_ready(vec![Candidate::new(CN_RTP, address, 40000)]);
    }
    pump(alice, bob);
    id
}

fn action_of(stanza: &Node) -> Option<&str> {
    stanza
        .get_child(NS_GINGLE, LN_SESSION)
        .and_then(|s| s.attr(ATTR_TYPE))
}

#[test]
fn test_call_reaches_in_progress_on_both_sides() {
    let mut alice = endpoint(ALICE, SignalingProtocol::Gingle2, false);
    let mut bob = endpoint(BOB, SignalingProtocol::Gingle2, true);

    let id = place_call(&mut alice, &mut bob);

    let caller = alice.manager.session(&id).unwrap();
    let callee = bob.manager.session(&id).unwrap();
    assert_eq!(caller.state(), State::InProgress);
    assert_eq!(callee.state(), State::InProgress);
    assert!(caller.is_initiator());
    assert!(!callee.is_initiator());
    assert_eq!(callee.remote_name(), ALICE);
    assert!(caller.is_transport_negotiated());
    assert!(callee.is_transport_negotiated());
    assert_eq!(caller.protocol(), SignalingProtocol::Gingle2);

    let remote = alice.transports.handle(&id).unwrap().remote_candidates();
    assert_eq!(remote, vec![Candidate::new(CN_RTP, "10.0.0.2", 40000)]);
}

#[test]
fn test_legacy_callee_downgrades_caller() {
    let mut alice = endpoint(ALICE, SignalingProtocol::Gingle2, false);
    let mut bob = endpoint(BOB, SignalingProtocol::Gingle, true);

    let id = place_call(&mut alice, &mut bob);

    let caller = alice.manager.session(&id).unwrap();
    assert_eq!(caller.protocol(), SignalingProtocol::Gingle);
    assert_eq!(caller.state(), State::InProgress);
    assert_eq!(
        bob.manager.session(&id).unwrap().state(),
        State::InProgress
    );
}

#[test]
fn test_terminate_destroys_both_sessions() {
    let mut alice = endpoint(ALICE, SignalingProtocol::Gingle2, false);
    let mut bob = endpoint(BOB, SignalingProtocol::Gingle2, true);
    let id = place_call(&mut alice, &mut bob);

    let mut destroyed = bob.manager.event_bus().session_destroyed.subscribe();
    let mut reasons = bob.manager.event_bus().terminate_reason.subscribe();

    alice
        .manager
        .session_mut(&id)
        .unwrap()
        .terminate_with_reason("success")
        .unwrap();
    let wire = pump(&mut alice, &mut bob);

    assert!(wire
        .iter()
        .any(|s| action_of(s) == Some(GINGLE_ACTION_TERMINATE)));
    assert_eq!(alice.manager.session_count(), 0);
    assert_eq!(bob.manager.session_count(), 0);
    assert_eq!(*destroyed.try_recv().unwrap(), id);
    let reason = reasons.try_recv().unwrap();
    assert_eq!(reason.1, "success");

    // Channels go away with the session.
    assert!(bob.transports.handle(&id).unwrap().channel_names().is_empty());
}

#[test]
fn test_rejected_offer_ends_without_terminate() {
    let mut alice = endpoint(ALICE, SignalingProtocol::Gingle2, false);
    let mut bob = endpoint(BOB, SignalingProtocol::Gingle2, false);

    let id = alice.manager.create_session(NS_GINGLE_AUDIO).unwrap();
    let offer = MediaSessionClient::new(
        vec![AudioCodec::new(0, "PCMU", 8000, 64000, 1)],
        Vec::new(),
    )
    .create_offer(false);
    alice
        .manager
        .session_mut(&id)
        .unwrap()
        .initiate(BOB, offer)
        .unwrap();
    pump(&mut alice, &mut bob);
    assert_eq!(
        bob.manager.session(&id).unwrap().state(),
        State::ReceivedInitiate
    );

    bob.manager.session_mut(&id).unwrap().reject().unwrap();
    let wire = pump(&mut alice, &mut bob);

    assert!(wire
        .iter()
        .any(|s| action_of(s) == Some(GINGLE_ACTION_REJECT)));
    assert!(!wire
        .iter()
        .any(|s| action_of(s) == Some(GINGLE_ACTION_TERMINATE)));
    assert_eq!(alice.manager.session_count(), 0);
    assert_eq!(bob.manager.session_count(), 0);
}

#[test]
fn test_message_for_unknown_session_is_item_not_found() {
    let mut bob = endpoint(BOB, SignalingProtocol::Gingle2, true);
    let stray = SessionStanzaBuilder::new(
        ActionType::TransportInfo,
        SignalingProtocol::Gingle2,
        &SessionId::new("999", ALICE),
    )
    .to(BOB)
    .id("stray-1")
    .build();

    deliver(ALICE, &mut bob, stray);
    let replies = bob.manager.drain_outgoing();

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].attr(ATTR_TYPE), Some(IQ_TYPE_ERROR));
    assert_eq!(replies[0].attr(ATTR_TO), Some(ALICE));
    assert_eq!(replies[0].attr(ATTR_ID), Some("stray-1"));
    let error = replies[0].get_optional_child(LN_ERROR).unwrap();
    assert_eq!(error.attr(ATTR_TYPE), Some(ERROR_TYPE_CANCEL));
    assert!(error.get_child(NS_STANZA_ERRORS, "item-not-found").is_some());
    assert_eq!(bob.manager.session_count(), 0);
}

#[test]
fn test_offer_for_unserved_content_type_is_refused() {
    let mut alice = endpoint(ALICE, SignalingProtocol::Gingle2, false);
    let mut bob = endpoint(BOB, SignalingProtocol::Gingle2, true);
    bob.manager.remove_client(NS_GINGLE_AUDIO);

    let id = alice.manager.create_session(NS_GINGLE_AUDIO).unwrap();
    let offer = MediaSessionClient::new(
        vec![AudioCodec::new(0, "PCMU", 8000, 64000, 1)],
        Vec::new(),
    )
    .create_offer(false);
    alice
        .manager
        .session_mut(&id)
        .unwrap()
        .initiate(BOB, offer)
        .unwrap();
    pump(&mut alice, &mut bob);

    assert_eq!(bob.manager.session_count(), 0);
    // The error reply ends the caller's session.
    assert_eq!(alice.manager.session_count(), 0);
}

#[test]
fn test_state_changes_are_broadcast_in_order() {
    let mut alice = endpoint(ALICE, SignalingProtocol::Gingle2, false);
    let mut bob = endpoint(BOB, SignalingProtocol::Gingle2, true);
    let mut created = bob.manager.event_bus().session_created.subscribe();
    let mut states = bob.manager.event_bus().state_changed.subscribe();

    let id = place_call(&mut alice, &mut bob);

    assert_eq!(*created.try_recv().unwrap(), id);
    let mut seen = Vec::new();
    loop {
        match states.try_recv() {
            Ok(change) => {
                assert_eq!(change.0, id);
                seen.push(change.1);
            }
            Err(TryRecvError::Empty) => break,
            Err(e) => panic!("unexpected receive error: {e}"),
        }
    }
    assert_eq!(
        seen,
        vec![
            State::ReceivedInitiate,
            State::SentAccept,
            State::InProgress
        ]
    );
}

#[test]
fn test_create_session_for_unknown_content_type_fails() {
    let mut alice = endpoint(ALICE, SignalingProtocol::Gingle2, false);
    assert!(alice.manager.create_session("urn:example:whiteboard").is_err());
    assert_eq!(alice.manager.session_count(), 0);
}

#[test]
fn test_refused_offers_do_not_leave_sessions_behind() {
    let mut bob = endpoint(BOB, SignalingProtocol::Gingle2, true);
    let mut parsers = ContentParserMap::new();
    MediaContentParser::new().register(&mut parsers);
    let offer = MediaSessionClient::new(
        vec![AudioCodec::new(0, "PCMU", 8000, 64000, 1)],
        Vec::new(),
    )
    .create_offer(false);

    for n in 0..5 {
        let children = SessionInitiate::new(NS_GINGLE_RAW, offer.contents.clone())
            .write(&parsers, SignalingProtocol::Gingle2)
            .unwrap();
        let initiate = SessionStanzaBuilder::new(
            ActionType::SessionInitiate,
            SignalingProtocol::Gingle2,
            &SessionId::new(format!("raw-{n}"), ALICE),
        )
        .to(BOB)
        .id(format!("raw-initiate-{n}"))
        .children(children)
        .build();
        deliver(ALICE, &mut bob, initiate);
    }
    bob.manager.process();

    let replies = bob.manager.drain_outgoing();
    assert_eq!(replies.len(), 5);
    for reply in &replies {
        assert_eq!(reply.attr(ATTR_TYPE), Some(IQ_TYPE_ERROR));
        let error = reply.get_optional_child(LN_ERROR).unwrap();
        assert!(error.get_child(NS_STANZA_ERRORS, "not-acceptable").is_some());
    }
    assert_eq!(bob.manager.session_count(), 0);
    assert_eq!(bob.manager.next_timeout(), None);
}
