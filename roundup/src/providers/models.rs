//! Data exchanged with external providers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::core::Slot;

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snippet {
    /// Result title.
    pub title: String,
    /// Result body text.
    pub body: String,
}

impl Snippet {
    /// Creates a snippet.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// `"title: body"` with the separator dropped when either side is empty.
    #[must_use]
    pub fn text(&self) -> String {
        let title = self.title.trim();
        let body = self.body.trim();
        match (title.is_empty(), body.is_empty()) {
            (false, false) => format!("{title}: {body}"),
            (false, true) => title.to_string(),
            (true, false) => body.to_string(),
            (true, true) => String::new(),
        }
    }

    /// Returns true if the snippet carries no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty() && self.body.trim().is_empty()
    }
}

/// Synthesized narration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechClip {
    /// Encoded audio (WAV).
    pub audio: Vec<u8>,
    /// Playback duration in milliseconds.
    pub duration_ms: u64,
}

/// Kind of slide to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideKind {
    /// Title and subtitle (intro and outro).
    Title,
    /// Topic title, bullets and optional image.
    Topic,
}

/// Content of one slide; layout is up to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideSpec {
    /// Slide kind.
    pub kind: SlideKind,
    /// Heading.
    pub title: String,
    /// Subtitle for title slides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Bullet lines for topic slides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
    /// Image to place on the slide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
}

impl SlideSpec {
    /// A title slide.
    #[must_use]
    pub fn title(title: impl Into<String>, subtitle: impl Into<String>) -> Self {
        Self {
            kind: SlideKind::Title,
            title: title.into(),
            subtitle: Some(subtitle.into()),
            bullets: Vec::new(),
            image: None,
        }
    }

    /// A topic slide.
    #[must_use]
    pub fn topic(title: impl Into<String>, bullets: Vec<String>, image: Option<PathBuf>) -> Self {
        Self {
            kind: SlideKind::Topic,
            title: title.into(),
            subtitle: None,
            bullets,
            image,
        }
    }
}

/// One slide shown for a span of the narration track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSegment {
    /// Slot the segment belongs to.
    pub slot: Slot,
    /// Slide image.
    pub slide: PathBuf,
    /// Offset into the narration track.
    pub start_ms: u64,
    /// Segment length.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_text_drops_dangling_separator() {
        assert_eq!(Snippet::new("Title", "Body").text(), "Title: Body");
        assert_eq!(Snippet::new("Title", "  ").text(), "Title");
        assert_eq!(Snippet::new("", "Body").text(), "Body");
        assert!(Snippet::new(" ", "").is_empty());
    }

    #[test]
    fn test_slide_spec_json_skips_empty_fields() {
        let json = serde_json::to_value(SlideSpec::title("Thanks for Watching", "Bye")).unwrap();
        assert_eq!(json["kind"], "title");
        assert!(json.get("bullets").is_none());
        assert!(json.get("image").is_none());
    }
}
