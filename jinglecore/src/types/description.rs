use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::constants::{CN_AUDIO, CN_VIDEO, is_audio_content, is_video_content};

/// Application payload negotiated for one content, e.g. a codec list.
///
/// The session core never looks inside; it stores the value and hands it to
/// the [`ContentParser`](crate::parsers::ContentParser) registered for the
/// content type. Any `PartialEq + Debug` type qualifies.
pub trait ContentDescription: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_description(&self, other: &dyn ContentDescription) -> bool;
}

impl<T> ContentDescription for T
where
    T: Any + fmt::Debug + PartialEq + Send + Sync,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_description(&self, other: &dyn ContentDescription) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

impl dyn ContentDescription {
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

#[derive(Debug, Clone)]
pub struct ContentInfo {
    pub name: String,
    /// Namespace of the description element; selects the content parser.
    pub content_type: String,
    pub description: Arc<dyn ContentDescription>,
}

impl ContentInfo {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        description: impl ContentDescription,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            description: Arc::new(description),
        }
    }
}

impl PartialEq for ContentInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.content_type == other.content_type
            && self.description.eq_description(other.description.as_ref())
    }
}

/// Content name for a description that carries none on the wire, as in the
/// legacy dialect.
pub fn content_name_for(content_type: &str) -> &str {
    if is_audio_content(content_type) {
        CN_AUDIO
    } else if is_video_content(content_type) {
        CN_VIDEO
    } else {
        content_type
    }
}

/// Ordered `(name, type, description)` triples offered or accepted by one side.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionDescription {
    pub contents: Vec<ContentInfo>,
}

impl SessionDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: Vec<ContentInfo>) -> Self {
        Self { contents }
    }

    pub fn add_content(
        &mut self,
        name: impl Into<String>,
        content_type: impl Into<String>,
        description: impl ContentDescription,
    ) {
        self.contents
            .push(ContentInfo::new(name, content_type, description));
    }

    pub fn get_content_by_name(&self, name: &str) -> Option<&ContentInfo> {
        self.contents.iter().find(|c| c.name == name)
    }

    pub fn first_content_by_type(&self, content_type: &str) -> Option<&ContentInfo> {
        self.contents.iter().find(|c| c.content_type == content_type)
    }

    pub fn first_content(&self) -> Option<&ContentInfo> {
        self.contents.first()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}
