use std::time::Duration;

use jingle_core::SignalingProtocol;
use serde::{Deserialize, Serialize};

/// Settings shared by every session a manager creates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionManagerConfig {
    /// How long a session's channels may stay unwritable before it times out.
    pub session_timeout_secs: u64,
    /// Dialect new sessions speak until a peer forces a downgrade.
    pub initial_protocol: SignalingProtocol,
    /// Buffer size of each event bus channel.
    pub event_capacity: usize,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 50,
            initial_protocol: SignalingProtocol::Gingle2,
            event_capacity: 64,
        }
    }
}

impl SessionManagerConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
