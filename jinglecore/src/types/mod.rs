mod candidate;
mod description;
mod session;

pub use candidate::Candidate;
pub use description::{ContentDescription, ContentInfo, SessionDescription, content_name_for};
pub use session::{ActionType, SessionId, SignalingProtocol};
