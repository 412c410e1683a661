use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use jingle_session::jingle_core::constants::{CN_RTCP, CN_RTP, NS_GINGLE_AUDIO};
use jingle_session::jingle_core::media::{AudioCodec, VideoCodec};
use jingle_session::jingle_core::{Candidate, SessionId, SignalingProtocol};
use jingle_session::transport::memory::MemoryTransportFactory;
use jingle_session::xml::{DisplayableNode, Node};
use jingle_session::{
    MediaSessionClient, SessionDriver, SessionError, SessionManager, SessionManagerConfig,
};
use log::{info, warn};
use tokio::sync::{broadcast, mpsc};

// Runs one call between two in-process endpoints over memory transports.
//
// Usage:
//   cargo run                                          # both sides speak gingle2
//   cargo run -- --callee-protocol gingle              # callee forces a downgrade
//   cargo run -- --video --hold-secs 5
//   cargo run -- --config manager.json                 # shared manager settings

const CALLER: &str = "alice@example.com/phone";
const CALLEE: &str = "bob@example.com/laptop";

#[derive(Parser, Debug)]
#[command(name = "jingle-loopback", about = "Place a call between two in-process endpoints")]
struct Args {
    /// Dialect the calling side starts with.
    #[arg(long, default_value_t = SignalingProtocol::Gingle2)]
    caller_protocol: SignalingProtocol,

    /// Dialect the answering side starts with.
    #[arg(long, default_value_t = SignalingProtocol::Gingle2)]
    callee_protocol: SignalingProtocol,

    /// Offer video alongside audio.
    #[arg(long)]
    video: bool,

    /// How long to keep the call up before hanging up.
    #[arg(long, default_value_t = 1)]
    hold_secs: u64,

    /// JSON file with manager settings.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Utc::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    rt.block_on(run(args))
}

fn local_codecs() -> (Vec<AudioCodec>, Vec<VideoCodec>) {
    (
        vec![
            AudioCodec::new(103, "ISAC", 16000, -1, 1),
            AudioCodec::new(0, "PCMU", 8000, 64000, 1),
        ],
        vec![VideoCodec::new(97, "H264", 320, 200, 30)],
    )
}

struct Endpoint {
    driver: SessionDriver,
    transports: Arc<MemoryTransportFactory>,
}

/// Builds a manager for `name`, starts its driver, and returns the channel
/// its outgoing stanzas arrive on.
fn endpoint(
    name: &'static str,
    config: SessionManagerConfig,
    client: MediaSessionClient,
    inbound: mpsc::Receiver<Node>,
) -> (Endpoint, mpsc::Receiver<Node>) {
    let transports = Arc::new(MemoryTransportFactory::new());
    let mut manager = SessionManager::new(name, config, transports.clone());
    manager.add_client(Arc::new(client));
    spawn_state_logger(name, manager.event_bus().state_changed.subscribe());

    let (outbound_tx, outbound_rx) = mpsc::channel(64);
    let driver = SessionDriver::new(manager, Arc::new(outbound_tx));
    tokio::spawn(driver.clone().run(inbound));

    (Endpoint { driver, transports }, outbound_rx)
}

fn spawn_state_logger(
    name: &'static str,
    mut states: broadcast::Receiver<Arc<(SessionId, jingle_session::State)>>,
) {
    tokio::spawn(async move {
        loop {
            match states.recv().await {
                Ok(change) => info!(target: "Loopback", "{name}: {} is now {}", change.0, change.1),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(target: "Loopback", "{name}: missed {n} state changes")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Plays the part of the signaling server: stamps the sender and delivers.
async fn relay(from: &'static str, mut rx: mpsc::Receiver<Node>, tx: mpsc::Sender<Node>) {
    while let Some(mut stanza) = rx.recv().await {
        stanza.attrs.insert("from".to_string(), from.to_string());
        info!(target: "Loopback", "{from} -> {}", DisplayableNode(&stanza));
        if tx.send(stanza).await.is_err() {
            break;
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let base = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            SessionManagerConfig::from_json(&json)?
        }
        None => SessionManagerConfig::default(),
    };
    let (audio, video) = local_codecs();

    let (caller_in_tx, caller_in_rx) = mpsc::channel(64);
    let (callee_in_tx, callee_in_rx) = mpsc::channel(64);

    let (caller, caller_out) = endpoint(
        CALLER,
        SessionManagerConfig {
            initial_protocol: args.caller_protocol,
            ..base.clone()
        },
        MediaSessionClient::new(audio.clone(), video.clone()),
        caller_in_rx,
    );
    let (callee, callee_out) = endpoint(
        CALLEE,
        SessionManagerConfig {
            initial_protocol: args.callee_protocol,
            ..base
        },
        MediaSessionClient::new(audio.clone(), video.clone()).with_auto_accept(true),
        callee_in_rx,
    );
    tokio::spawn(relay(CALLER, caller_out, callee_in_tx));
    tokio::spawn(relay(CALLEE, callee_out, caller_in_tx));

    let offer = MediaSessionClient::new(audio, video).create_offer(args.video);
    let session_id = caller
        .driver
        .with_manager(|m| -> Result<SessionId, SessionError> {
            let id = m.create_session(NS_GINGLE_AUDIO)?;
            let session = m.session_mut(&id)?;
            session.initiate(CALLEE, offer)?;
            session.create_channel(NS_GINGLE_AUDIO, CN_RTP);
            session.create_channel(NS_GINGLE_AUDIO, CN_RTCP);
            Ok(id)
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    callee
        .driver
        .with_manager(|m| -> Result<(), SessionError> {
            let session = m.session_mut(&session_id)?;
            session.create_channel(NS_GINGLE_AUDIO, CN_RTP);
            session.create_channel(NS_GINGLE_AUDIO, CN_RTCP);
            Ok(())
        })
        .await?;

    for (endpoint, address) in [(&caller, "127.0.0.1"), (&callee, "127.0.0.2")] {
        let handle = endpoint
            .transports
            .handle(&session_id)
            .context("no transport for session")?;
        handle.signal_connecting();
        handle.candidates_ready(vec![
            Candidate::new(CN_RTP, address, 40000).with_type("local"),
            Candidate::new(CN_RTCP, address, 40001).with_type("local"),
        ]);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    for endpoint in [&caller, &callee] {
        if let Some(handle) = endpoint.transports.handle(&session_id) {
            handle.set_writable(true);
        }
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    for (name, endpoint) in [(CALLER, &caller), (CALLEE, &callee)] {
        endpoint
            .driver
            .with_manager(|m| {
                if let Some(session) = m.session(&session_id) {
                    info!(
                        target: "Loopback",
                        "{name}: {} speaking {}, transport negotiated: {}",
                        session.state(),
                        session.protocol(),
                        session.is_transport_negotiated()
                    );
                }
            })
            .await;
    }

    tokio::time::sleep(Duration::from_secs(args.hold_secs)).await;
    caller
        .driver
        .with_manager(|m| -> Result<(), SessionError> {
            m.session_mut(&session_id)?.terminate_with_reason("success")
        })
        .await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    for (name, endpoint) in [(CALLER, &caller), (CALLEE, &callee)] {
        let remaining = endpoint.driver.with_manager(|m| m.session_count()).await;
        info!(target: "Loopback", "{name}: {remaining} session(s) left");
    }
    Ok(())
}
