//! Applications that own session content.
//!
//! A [`SessionClient`] is registered with the manager for the content types
//! it understands. The manager routes new sessions of those types to it and
//! asks it how to answer incoming offers.

use std::sync::Arc;

use jingle_core::constants::{CN_AUDIO, CN_VIDEO, NS_GINGLE_AUDIO, NS_GINGLE_VIDEO};
use jingle_core::media::{
    AudioCodec, AudioContentDescription, MediaContentParser, VideoCodec, VideoContentDescription,
};
use jingle_core::{ContentParser, SessionDescription, SessionId};
use log::info;

/// What the client wants done with an incoming offer.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InitiateResponse {
    /// Leave the session in `ReceivedInitiate`; the application answers later.
    #[default]
    Pending,
    Accept(SessionDescription),
    Reject,
}

pub trait SessionClient: Send + Sync {
    /// Content types (description namespaces) this client serves.
    fn content_types(&self) -> Vec<String>;

    fn content_parser(&self) -> Arc<dyn ContentParser>;

    fn on_session_create(&self, _session_id: &SessionId, _received_initiate: bool) {}

    /// Called synchronously while the initiate is dispatched, before any
    /// transport negotiation. Accepting here defers the accept message until
    /// the transport is negotiated.
    fn on_incoming_initiate(
        &self,
        _session_id: &SessionId,
        _offer: &SessionDescription,
    ) -> InitiateResponse {
        InitiateResponse::Pending
    }

    fn on_session_destroy(&self, _session_id: &SessionId) {}
}

/// Voice and video calls over the Gingle media namespaces.
#[derive(Debug, Clone)]
pub struct MediaSessionClient {
    audio_codecs: Vec<AudioCodec>,
    video_codecs: Vec<VideoCodec>,
    auto_accept: bool,
}

impl MediaSessionClient {
    pub fn new(audio_codecs: Vec<AudioCodec>, video_codecs: Vec<VideoCodec>) -> Self {
        Self {
            audio_codecs,
            video_codecs,
            auto_accept: false,
        }
    }

    /// Answer every acceptable offer without waiting for the application.
    pub fn with_auto_accept(mut self, auto_accept: bool) -> Self {
        self.auto_accept = auto_accept;
        self
    }

    pub fn create_offer(&self, video: bool) -> SessionDescription {
        let mut offer = SessionDescription::new();
        offer.add_content(
            CN_AUDIO,
            NS_GINGLE_AUDIO,
            AudioContentDescription {
                codecs: self.audio_codecs.clone(),
                ssrc: None,
            },
        );
        if video {
            offer.add_content(
                CN_VIDEO,
                NS_GINGLE_VIDEO,
                VideoContentDescription {
                    codecs: self.video_codecs.clone(),
                    ssrc: None,
                },
            );
        }
        offer
    }

    /// Intersects `offer` with the local codecs, keeping the offerer's
    /// payload ids and order.
    pub fn create_answer(&self, offer: &SessionDescription) -> SessionDescription {
        let mut answer = SessionDescription::new();

        let offered_audio = offer
            .first_content_by_type(NS_GINGLE_AUDIO)
            .and_then(|c| c.description.downcast_ref::<AudioContentDescription>());
        if let Some(audio) = offered_audio {
            let codecs = audio
                .codecs
                .iter()
                .filter(|theirs| self.audio_codecs.iter().any(|ours| ours.matches(theirs)))
                .cloned()
                .collect();
            answer.add_content(
                CN_AUDIO,
                NS_GINGLE_AUDIO,
                AudioContentDescription { codecs, ssrc: None },
            );
        }

        let offered_video = offer
            .first_content_by_type(NS_GINGLE_VIDEO)
            .and_then(|c| c.description.downcast_ref::<VideoContentDescription>());
        if let Some(video) = offered_video {
            let codecs = video
                .codecs
                .iter()
                .filter(|theirs| self.video_codecs.iter().any(|ours| ours.matches(theirs)))
                .cloned()
                .collect();
            answer.add_content(
                CN_VIDEO,
                NS_GINGLE_VIDEO,
                VideoContentDescription { codecs, ssrc: None },
            );
        }

        answer
    }
}

impl SessionClient for MediaSessionClient {
    fn content_types(&self) -> Vec<String> {
        MediaContentParser::CONTENT_TYPES
            .iter()
            .map(|ct| ct.to_string())
            .collect()
    }

    fn content_parser(&self) -> Arc<dyn ContentParser> {
        Arc::new(MediaContentParser::new())
    }

    fn on_session_create(&self, session_id: &SessionId, received_initiate: bool) {
        let direction = if received_initiate { "incoming" } else { "outgoing" };
        info!(target: "MediaClient", "{direction} call {session_id}");
    }

    fn on_incoming_initiate(
        &self,
        session_id: &SessionId,
        offer: &SessionDescription,
    ) -> InitiateResponse {
        let answer = self.create_answer(offer);
        let has_audio = answer
            .first_content_by_type(NS_GINGLE_AUDIO)
            .and_then(|c| c.description.downcast_ref::<AudioContentDescription>())
            .is_some_and(|audio| !audio.codecs.is_empty());

        if !has_audio {
            info!(target: "MediaClient", "rejecting {session_id}: no common audio codec");
            InitiateResponse::Reject
        } else if self.auto_accept {
            InitiateResponse::Accept(answer)
        } else {
            InitiateResponse::Pending
        }
    }

    fn on_session_destroy(&self, session_id: &SessionId) {
        info!(target: "MediaClient", "call {session_id} ended");
    }
}
