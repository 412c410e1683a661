//! Runs a [`SessionManager`] on a tokio runtime.
//!
//! The manager itself is sans-IO. The driver feeds it inbound stanzas from an
//! mpsc channel, processes transport events as soon as a transport raises
//! them, fires the writability watchdogs when their deadlines pass, and hands
//! everything the manager produces to a [`StanzaSink`].

use std::future;
use std::sync::Arc;

use async_trait::async_trait;
use jingle_core::xml::Node;
use log::{debug, info, warn};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::Instant;

use crate::manager::SessionManager;

/// Where outgoing stanzas go, typically the signaling connection.
#[async_trait]
pub trait StanzaSink: Send + Sync {
    async fn send_stanza(&self, stanza: Node) -> Result<(), anyhow::Error>;
}

#[async_trait]
impl StanzaSink for mpsc::Sender<Node> {
    async fn send_stanza(&self, stanza: Node) -> Result<(), anyhow::Error> {
        self.send(stanza)
            .await
            .map_err(|_| anyhow::anyhow!("outbound stanza channel closed"))
    }
}

/// Shared handle to a running manager. Cloning is cheap.
#[derive(Clone)]
pub struct SessionDriver {
    manager: Arc<Mutex<SessionManager>>,
    sink: Arc<dyn StanzaSink>,
    wake: Arc<Notify>,
}

impl SessionDriver {
    pub fn new(manager: SessionManager, sink: Arc<dyn StanzaSink>) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
            sink,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Runs `f` against the manager, then processes the resulting work and
    /// flushes outgoing stanzas before returning.
    pub async fn with_manager<R>(&self, f: impl FnOnce(&mut SessionManager) -> R) -> R {
        let (result, outgoing) = {
            let mut manager = self.manager.lock().await;
            let result = f(&mut manager);
            manager.process();
            (result, manager.drain_outgoing())
        };
        self.flush(outgoing).await;
        self.wake.notify_one();
        result
    }

    async fn flush(&self, outgoing: Vec<Node>) {
        for stanza in outgoing {
            if let Err(e) = self.sink.send_stanza(stanza).await {
                warn!(target: "Driver", "Dropping outgoing stanza: {e}");
                break;
            }
        }
    }

    /// The main driver loop. Returns once `inbound` is closed.
    pub async fn run(self, mut inbound: mpsc::Receiver<Node>) {
        info!(target: "Driver", "Session driver started");
        let transport_waker = self.manager.lock().await.transport_waker().clone();
        loop {
            let deadline = self.manager.lock().await.next_timeout();

            tokio::select! {
                stanza = inbound.recv() => {
                    let Some(stanza) = stanza else {
                        debug!(target: "Driver", "Inbound channel closed, exiting driver loop.");
                        break;
                    };
                    self.with_manager(|m| m.on_incoming_stanza(&stanza)).await;
                }
                _ = transport_waker.woken() => {
                    self.with_manager(|_| ()).await;
                }
                _ = sleep_until(deadline) => {
                    self.with_manager(|m| m.handle_timeouts(Instant::now())).await;
                }
                _ = self.wake.notified() => {
                    // A caller touched the manager; recompute the deadline.
                }
            }
        }
        info!(target: "Driver", "Session driver stopped");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
