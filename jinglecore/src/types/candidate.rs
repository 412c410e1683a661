use serde::Serialize;

/// A connectivity candidate advertised by one side of a transport.
///
/// The session never interprets candidates; it buffers, forwards and resends
/// them verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Channel this candidate belongs to (`rtp`, `rtcp`, `video_rtp`, ...).
    pub name: String,
    pub address: String,
    pub port: u16,
    pub protocol: String,
    pub username: String,
    pub password: String,
    pub preference: f32,
    pub candidate_type: String,
    pub network_name: String,
    pub generation: u32,
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: String::new(),
            port: 0,
            protocol: "udp".to_string(),
            username: String::new(),
            password: String::new(),
            preference: 0.0,
            candidate_type: String::new(),
            network_name: String::new(),
            generation: 0,
        }
    }
}

impl Candidate {
    pub fn new(name: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_preference(mut self, preference: f32) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_type(mut self, candidate_type: impl Into<String>) -> Self {
        self.candidate_type = candidate_type.into();
        self
    }

    pub fn with_network(mut self, network_name: impl Into<String>) -> Self {
        self.network_name = network_name.into();
        self
    }

    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }
}
