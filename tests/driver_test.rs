use std::sync::Arc;
use std::time::Duration;

use jingle_session::jingle_core::constants::*;
use jingle_session::jingle_core::media::AudioCodec;
use jingle_session::jingle_core::{
    ActionType, Candidate, SessionId, SessionStanzaBuilder, SignalingProtocol,
};
use jingle_session::transport::memory::MemoryTransportFactory;
use jingle_session::xml::Node;
use jingle_session::{
    ErrorCode, MediaSessionClient, SessionDriver, SessionManager, SessionManagerConfig, State,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const ALICE: &str = "alice@example.com/phone";
const BOB: &str = "bob@example.com/laptop";

struct Harness {
    driver: SessionDriver,
    transports: Arc<MemoryTransportFactory>,
    inbound: mpsc::Sender<Node>,
    outbound: mpsc::Receiver<Node>,
    task: JoinHandle<()>,
}

fn start(session_timeout_secs: u64) -> Harness {
    let transports = Arc::new(MemoryTransportFactory::new());
    let config = SessionManagerConfig {
        session_timeout_secs,
        ..SessionManagerConfig::default()
    };
    let mut manager = SessionManager::new(ALICE, config, transports.clone());
    manager.add_client(Arc::new(MediaSessionClient::new(
        vec![AudioCodec::new(0, "PCMU", 8000, 64000, 1)],
        Vec::new(),
    )));

    let (inbound, inbound_rx) = mpsc::channel(16);
    let (outbound_tx, outbound) = mpsc::channel(16);
    let driver = SessionDriver::new(manager, Arc::new(outbound_tx));
    let task = tokio::spawn(driver.clone().run(inbound_rx));
    Harness {
        driver,
        transports,
        inbound,
        outbound,
        task,
    }
}

async fn place_call(harness: &Harness) -> SessionId {
    let offer = MediaSessionClient::new(
        vec![AudioCodec::new(0, "PCMU", 8000, 64000, 1)],
        Vec::new(),
    )
    .create_offer(false);
    harness
        .driver
        .with_manager(|m| {
            let id = m.create_session(NS_GINGLE_AUDIO).unwrap();
            let session = m.session_mut(&id).unwrap();
            session.initiate(BOB, offer).unwrap();
            session.create_channel(NS_GINGLE_AUDIO, CN_RTP);
            id
        })
        .await
}

fn action_of(stanza: &Node) -> Option<&str> {
    stanza
        .get_child(NS_GINGLE, LN_SESSION)
        .and_then(|s| s.attr(ATTR_TYPE))
}

#[tokio::test(start_paused = true)]
async fn test_unwritable_transport_times_out() {
    let mut harness = start(5);
    let id = place_call(&harness).await;
    let initiate = harness.outbound.recv().await.unwrap();
    assert_eq!(action_of(&initiate), Some(GINGLE_ACTION_INITIATE));

    let mut errors = harness
        .driver
        .with_manager(|m| m.event_bus().error_changed.subscribe())
        .await;
    harness.transports.handle(&id).unwrap().signal_connecting();

    tokio::time::sleep(Duration::from_secs(6)).await;

    let terminate = harness.outbound.recv().await.unwrap();
    assert_eq!(action_of(&terminate), Some(GINGLE_ACTION_TERMINATE));
    let change = errors.recv().await.unwrap();
    assert_eq!(*change, (id.clone(), ErrorCode::Timeout));
    assert_eq!(harness.driver.with_manager(|m| m.session_count()).await, 0);

    drop(harness.inbound);
    harness.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_writable_transport_keeps_session() {
    let mut harness = start(5);
    let id = place_call(&harness).await;
    harness.outbound.recv().await.unwrap();

    let handle = harness.transports.handle(&id).unwrap();
    handle.signal_connecting();
    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.set_writable(true);

    tokio::time::sleep(Duration::from_secs(30)).await;

    let state = harness
        .driver
        .with_manager(|m| m.session(&id).map(|s| (s.state(), s.error())))
        .await;
    assert_eq!(state, Some((State::SentInitiate, ErrorCode::None)));
    assert!(harness.outbound.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_transport_events_are_processed_without_prompting() {
    let mut harness = start(5);
    let id = place_call(&harness).await;
    harness.outbound.recv().await.unwrap();

    let handle = harness.transports.handle(&id).unwrap();
    handle.signal_connecting();
    handle.candidates_ready(vec![Candidate::new(CN_RTP, "10.0.0.1", 40000)]);

    let candidates = harness.outbound.recv().await.unwrap();
    assert_eq!(action_of(&candidates), Some(JINGLE_ACTION_TRANSPORT_INFO));

    tokio::time::sleep(Duration::from_secs(6)).await;
    let terminate = harness.outbound.recv().await.unwrap();
    assert_eq!(action_of(&terminate), Some(GINGLE_ACTION_TERMINATE));
    assert_eq!(harness.driver.with_manager(|m| m.session_count()).await, 0);

    drop(harness.inbound);
    harness.task.await.unwrap();
}

#[tokio::test]
async fn test_inbound_stanzas_are_answered() {
    let mut harness = start(50);
    let mut stray = SessionStanzaBuilder::new(
        ActionType::SessionTerminate,
        SignalingProtocol::Gingle2,
        &SessionId::new("1234", BOB),
    )
    .to(ALICE)
    .id("bob-7")
    .build();
    stray.attrs.insert(ATTR_FROM.to_string(), BOB.to_string());

    harness.inbound.send(stray).await.unwrap();
    let reply = harness.outbound.recv().await.unwrap();

    assert_eq!(reply.attr(ATTR_TYPE), Some(IQ_TYPE_ERROR));
    assert_eq!(reply.attr(ATTR_ID), Some("bob-7"));
    assert_eq!(reply.attr(ATTR_TO), Some(BOB));

    drop(harness.inbound);
    harness.task.await.unwrap();
}
