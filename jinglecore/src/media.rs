//! Audio and video descriptions for the Gingle media namespaces.
//!
//! Payload types map one-to-one to codecs; an optional `src-id` child carries
//! the stream's SSRC.

use std::sync::Arc;

use jingle_xml::{Node, NodeBuilder};

use crate::constants::*;
use crate::error::{ParseError, WriteError};
use crate::parsers::{ContentParser, ContentParserMap};
use crate::types::{ContentDescription, SignalingProtocol};

/// Payload ids below this value are statically assigned and matched by id alone.
const FIRST_DYNAMIC_PAYLOAD_ID: i32 = 96;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioCodec {
    pub id: i32,
    pub name: String,
    pub clockrate: i32,
    pub bitrate: i32,
    pub channels: i32,
}

impl AudioCodec {
    pub fn new(id: i32, name: impl Into<String>, clockrate: i32, bitrate: i32, channels: i32) -> Self {
        Self {
            id,
            name: name.into(),
            clockrate,
            bitrate,
            channels,
        }
    }

    /// Whether `other` names the same codec, as used when intersecting an offer.
    pub fn matches(&self, other: &AudioCodec) -> bool {
        if self.id < FIRST_DYNAMIC_PAYLOAD_ID && other.id < FIRST_DYNAMIC_PAYLOAD_ID {
            self.id == other.id
        } else {
            self.name.eq_ignore_ascii_case(&other.name) && self.clockrate == other.clockrate
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCodec {
    pub id: i32,
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub framerate: i32,
}

impl VideoCodec {
    pub fn new(id: i32, name: impl Into<String>, width: i32, height: i32, framerate: i32) -> Self {
        Self {
            id,
            name: name.into(),
            width,
            height,
            framerate,
        }
    }

    pub fn matches(&self, other: &VideoCodec) -> bool {
        if self.id < FIRST_DYNAMIC_PAYLOAD_ID && other.id < FIRST_DYNAMIC_PAYLOAD_ID {
            self.id == other.id
        } else {
            self.name.eq_ignore_ascii_case(&other.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioContentDescription {
    pub codecs: Vec<AudioCodec>,
    pub ssrc: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoContentDescription {
    pub codecs: Vec<VideoCodec>,
    pub ssrc: Option<u32>,
}

/// Codecs assumed for a legacy peer whose audio description lists no payload
/// types. Old clients did not send any.
pub fn legacy_default_audio_codecs() -> Vec<AudioCodec> {
    vec![
        AudioCodec::new(103, "ISAC", 16000, -1, 1),
        AudioCodec::new(0, "PCMU", 8000, 64000, 1),
    ]
}

fn parse_ssrc(elem: &Node, ns: &str) -> Result<Option<u32>, ParseError> {
    let Some(src_id) = elem.get_child(ns, LN_SRCID) else {
        return Ok(None);
    };
    let body = src_id.text().unwrap_or_default().trim();
    if body.is_empty() {
        return Ok(Some(0));
    }
    body.parse::<u32>()
        .map(Some)
        .map_err(|e| ParseError::Invalid {
            field: "src-id",
            reason: e.to_string(),
        })
}

fn write_ssrc(ssrc: Option<u32>, ns: &str) -> Option<Node> {
    ssrc.map(|ssrc| {
        let builder = NodeBuilder::new(LN_SRCID).ns(ns);
        if ssrc == 0 {
            builder.build()
        } else {
            builder.string_content(ssrc.to_string()).build()
        }
    })
}

fn parse_audio_codec(elem: &Node) -> Option<AudioCodec> {
    let mut attrs = elem.attrs();
    let id = attrs.optional_i32(ATTR_ID).unwrap_or(-1);
    if id < 0 {
        return None;
    }
    Some(AudioCodec {
        id,
        name: attrs.optional_string(ATTR_NAME).unwrap_or_default().to_string(),
        clockrate: attrs.optional_i32(ATTR_CLOCKRATE).unwrap_or(0),
        bitrate: attrs.optional_i32(ATTR_BITRATE).unwrap_or(0),
        channels: attrs.optional_i32(ATTR_CHANNELS).unwrap_or(1),
    })
}

fn parse_video_codec(elem: &Node) -> Option<VideoCodec> {
    let mut attrs = elem.attrs();
    let id = attrs.optional_i32(ATTR_ID).unwrap_or(-1);
    if id < 0 {
        return None;
    }
    Some(VideoCodec {
        id,
        name: attrs.optional_string(ATTR_NAME).unwrap_or_default().to_string(),
        width: attrs.optional_i32(ATTR_WIDTH).unwrap_or(0),
        height: attrs.optional_i32(ATTR_HEIGHT).unwrap_or(0),
        framerate: attrs.optional_i32(ATTR_FRAMERATE).unwrap_or(0),
    })
}

fn write_audio_codec(codec: &AudioCodec, ns: &str) -> Node {
    let mut builder = NodeBuilder::new(LN_PAYLOADTYPE)
        .ns(ns)
        .attr(ATTR_ID, codec.id.to_string())
        .attr(ATTR_NAME, codec.name.as_str());
    if codec.clockrate > 0 {
        builder = builder.attr(ATTR_CLOCKRATE, codec.clockrate.to_string());
    }
    if codec.bitrate > 0 {
        builder = builder.attr(ATTR_BITRATE, codec.bitrate.to_string());
    }
    if codec.channels > 1 {
        builder = builder.attr(ATTR_CHANNELS, codec.channels.to_string());
    }
    builder.build()
}

fn write_video_codec(codec: &VideoCodec, ns: &str) -> Node {
    NodeBuilder::new(LN_PAYLOADTYPE)
        .ns(ns)
        .attr(ATTR_ID, codec.id.to_string())
        .attr(ATTR_NAME, codec.name.as_str())
        .attr(ATTR_WIDTH, codec.width.to_string())
        .attr(ATTR_HEIGHT, codec.height.to_string())
        .attr(ATTR_FRAMERATE, codec.framerate.to_string())
        .build()
}

/// Content parser for the Gingle audio (`phone`) and video namespaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediaContentParser;

impl MediaContentParser {
    pub const CONTENT_TYPES: [&'static str; 2] = [NS_GINGLE_AUDIO, NS_GINGLE_VIDEO];

    pub fn new() -> Self {
        Self
    }

    /// Registers one shared parser under every media namespace.
    pub fn register(self, parsers: &mut ContentParserMap) {
        let parser: Arc<dyn ContentParser> = Arc::new(self);
        for content_type in Self::CONTENT_TYPES {
            parsers.insert(content_type.to_string(), parser.clone());
        }
    }

    pub fn parse_audio(
        &self,
        elem: &Node,
        protocol: SignalingProtocol,
    ) -> Result<AudioContentDescription, ParseError> {
        let codecs = if protocol.is_legacy() && !elem.has_children() {
            legacy_default_audio_codecs()
        } else {
            elem.child_nodes()
                .filter(|c| c.is(NS_GINGLE_AUDIO, LN_PAYLOADTYPE))
                .filter_map(parse_audio_codec)
                .collect()
        };
        Ok(AudioContentDescription {
            codecs,
            ssrc: parse_ssrc(elem, NS_GINGLE_AUDIO)?,
        })
    }

    pub fn parse_video(&self, elem: &Node) -> Result<VideoContentDescription, ParseError> {
        let codecs = elem
            .child_nodes()
            .filter(|c| c.is(NS_GINGLE_VIDEO, LN_PAYLOADTYPE))
            .filter_map(parse_video_codec)
            .collect();
        Ok(VideoContentDescription {
            codecs,
            ssrc: parse_ssrc(elem, NS_GINGLE_VIDEO)?,
        })
    }
}

impl ContentParser for MediaContentParser {
    fn parse_content(
        &self,
        elem: &Node,
        protocol: SignalingProtocol,
    ) -> Result<Arc<dyn ContentDescription>, ParseError> {
        match elem.ns.as_str() {
            NS_GINGLE_AUDIO => Ok(Arc::new(self.parse_audio(elem, protocol)?)),
            NS_GINGLE_VIDEO => Ok(Arc::new(self.parse_video(elem)?)),
            other => Err(ParseError::UnknownMediaType(other.to_string())),
        }
    }

    fn write_content(
        &self,
        content_type: &str,
        description: &dyn ContentDescription,
    ) -> Result<Node, WriteError> {
        let mismatch = || WriteError::DescriptionMismatch(content_type.to_string());
        match content_type {
            NS_GINGLE_AUDIO => {
                let audio = description
                    .downcast_ref::<AudioContentDescription>()
                    .ok_or_else(mismatch)?;
                let children = audio
                    .codecs
                    .iter()
                    .map(|c| write_audio_codec(c, NS_GINGLE_AUDIO))
                    .chain(write_ssrc(audio.ssrc, NS_GINGLE_AUDIO));
                Ok(NodeBuilder::new(LN_DESCRIPTION)
                    .ns(NS_GINGLE_AUDIO)
                    .children(children)
                    .build())
            }
            NS_GINGLE_VIDEO => {
                let video = description
                    .downcast_ref::<VideoContentDescription>()
                    .ok_or_else(mismatch)?;
                let children = video
                    .codecs
                    .iter()
                    .map(|c| write_video_codec(c, NS_GINGLE_VIDEO))
                    .chain(write_ssrc(video.ssrc, NS_GINGLE_VIDEO));
                Ok(NodeBuilder::new(LN_DESCRIPTION)
                    .ns(NS_GINGLE_VIDEO)
                    .children(children)
                    .build())
            }
            other => Err(WriteError::UnknownContentType(other.to_string())),
        }
    }
}
