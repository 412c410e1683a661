//! Peer-to-peer session signaling.
//!
//! Two endpoints negotiate a media session by exchanging session stanzas: one
//! side offers, the other accepts or rejects, both trade connectivity
//! candidates, and either side may terminate. The wire codec lives in
//! [`jingle_core`]; this crate holds the per-session state machine, the
//! manager that routes stanzas to sessions, and a tokio driver.

// Re-export the wire layer
pub use jingle_core;
pub use jingle_core::xml;

pub mod client;
pub mod config;
pub mod driver;
pub mod events;
pub mod manager;
pub mod session;
pub mod transport;

pub use client::{InitiateResponse, MediaSessionClient, SessionClient};
pub use config::SessionManagerConfig;
pub use driver::{SessionDriver, StanzaSink};
pub use events::EventBus;
pub use manager::SessionManager;
pub use session::{ErrorCode, Session, SessionError, SessionEvent, State};
pub use transport::{Transport, TransportEvent, TransportFactory};
