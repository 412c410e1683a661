//! Namespaces, element names and attribute names of the session protocol.

pub const NS_GINGLE: &str = "http://www.google.com/session";
pub const NS_STANZA_ERRORS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

// Gingle action names. `transport-info` is shared with Jingle.
pub const GINGLE_ACTION_INITIATE: &str = "initiate";
pub const GINGLE_ACTION_INFO: &str = "info";
pub const GINGLE_ACTION_ACCEPT: &str = "accept";
pub const GINGLE_ACTION_REJECT: &str = "reject";
pub const GINGLE_ACTION_TERMINATE: &str = "terminate";
pub const GINGLE_ACTION_CANDIDATES: &str = "candidates";

pub const JINGLE_ACTION_SESSION_INITIATE: &str = "session-initiate";
pub const JINGLE_ACTION_SESSION_INFO: &str = "session-info";
pub const JINGLE_ACTION_SESSION_ACCEPT: &str = "session-accept";
pub const JINGLE_ACTION_SESSION_TERMINATE: &str = "session-terminate";
pub const JINGLE_ACTION_TRANSPORT_INFO: &str = "transport-info";
pub const JINGLE_ACTION_TRANSPORT_ACCEPT: &str = "transport-accept";

pub const LN_IQ: &str = "iq";
pub const LN_SESSION: &str = "session";
pub const LN_DESCRIPTION: &str = "description";
pub const LN_TRANSPORT: &str = "transport";
pub const LN_CANDIDATE: &str = "candidate";
pub const LN_PAYLOADTYPE: &str = "payload-type";
pub const LN_SRCID: &str = "src-id";
pub const LN_ERROR: &str = "error";
pub const LN_TEXT: &str = "text";

pub const ATTR_ID: &str = "id";
pub const ATTR_TYPE: &str = "type";
pub const ATTR_TO: &str = "to";
pub const ATTR_FROM: &str = "from";
pub const ATTR_INITIATOR: &str = "initiator";

pub const IQ_TYPE_SET: &str = "set";
pub const IQ_TYPE_RESULT: &str = "result";
pub const IQ_TYPE_ERROR: &str = "error";

pub const CN_AUDIO: &str = "audio";
pub const CN_VIDEO: &str = "video";

pub const NS_JINGLE_AUDIO: &str = "urn:xmpp:jingle:apps:rtp:audio";
pub const NS_JINGLE_VIDEO: &str = "urn:xmpp:jingle:apps:rtp:video";
pub const NS_GINGLE_AUDIO: &str = "http://www.google.com/session/phone";
pub const NS_GINGLE_VIDEO: &str = "http://www.google.com/session/video";

pub const ATTR_NAME: &str = "name";
pub const ATTR_CLOCKRATE: &str = "clockrate";
pub const ATTR_BITRATE: &str = "bitrate";
pub const ATTR_CHANNELS: &str = "channels";
pub const ATTR_WIDTH: &str = "width";
pub const ATTR_HEIGHT: &str = "height";
pub const ATTR_FRAMERATE: &str = "framerate";

pub const NS_GINGLE_P2P: &str = "http://www.google.com/transport/p2p";
pub const NS_GINGLE_RAW: &str = "http://www.google.com/transport/raw-udp";

pub const ATTR_ADDRESS: &str = "address";
pub const ATTR_PORT: &str = "port";
pub const ATTR_USERNAME: &str = "username";
pub const ATTR_PASSWORD: &str = "password";
pub const ATTR_PREFERENCE: &str = "preference";
pub const ATTR_PROTOCOL: &str = "protocol";
pub const ATTR_CANDIDATE_TYPE: &str = "type";
pub const ATTR_NETWORK: &str = "network";
pub const ATTR_GENERATION: &str = "generation";

pub const CN_RTP: &str = "rtp";
pub const CN_RTCP: &str = "rtcp";
pub const CN_VIDEO_RTP: &str = "video_rtp";
pub const CN_VIDEO_RTCP: &str = "video_rtcp";

/// Error types on which a failed send is retried rather than treated as fatal.
pub const ERROR_TYPE_CONTINUE: &str = "continue";
pub const ERROR_TYPE_WAIT: &str = "wait";
pub const ERROR_TYPE_MODIFY: &str = "modify";
pub const ERROR_TYPE_CANCEL: &str = "cancel";

pub fn is_audio_content(content_type: &str) -> bool {
    content_type == NS_GINGLE_AUDIO || content_type == NS_JINGLE_AUDIO
}

pub fn is_video_content(content_type: &str) -> bool {
    content_type == NS_GINGLE_VIDEO || content_type == NS_JINGLE_VIDEO
}
