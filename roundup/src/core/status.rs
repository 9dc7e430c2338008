//! Stage names and the per-topic state machine states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named unit of work in the pipeline.
///
/// Declaration order is pipeline order; manifest entries sort by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Web search and snippet aggregation.
    Search,
    /// Bullets, narration script and image keywords for a topic.
    Summarize,
    /// Intro or outro narration text.
    Narration,
    /// Image fetch and validation.
    Image,
    /// Speech synthesis.
    Speech,
    /// Slide rendering.
    Slide,
    /// Combined document (assembly).
    Document,
    /// Concatenated narration track (assembly).
    AudioTrack,
    /// Final rendered video (assembly).
    Video,
}

impl StageName {
    /// Stable snake-case name used in keys and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Summarize => "summarize",
            Self::Narration => "narration",
            Self::Image => "image",
            Self::Speech => "speech",
            Self::Slide => "slide",
            Self::Document => "document",
            Self::AudioTrack => "audio_track",
            Self::Video => "video",
        }
    }

    /// Parses the snake-case name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "search" => Self::Search,
            "summarize" => Self::Summarize,
            "narration" => Self::Narration,
            "image" => Self::Image,
            "speech" => Self::Speech,
            "slide" => Self::Slide,
            "document" => Self::Document,
            "audio_track" => Self::AudioTrack,
            "video" => Self::Video,
            _ => return None,
        })
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a topic pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicState {
    /// Not started.
    #[default]
    Pending,
    /// Running queries against the search provider.
    Searching,
    /// Generating bullets, script and keywords.
    Summarizing,
    /// Fetching and validating an image.
    ImageFetching,
    /// Synthesizing narration audio.
    Synthesizing,
    /// Rendering the topic slide.
    SlideBuilding,
    /// All stages succeeded.
    Complete,
    /// Completed without an image (text-only fallback).
    PartialComplete,
    /// Stopped; excluded from assembly.
    Failed,
}

impl TopicState {
    /// The working states in order.
    pub const WORKING: [Self; 5] = [
        Self::Searching,
        Self::Summarizing,
        Self::ImageFetching,
        Self::Synthesizing,
        Self::SlideBuilding,
    ];

    /// Returns true for Complete, PartialComplete and Failed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::PartialComplete | Self::Failed)
    }

    /// Returns true if the topic contributes to the final artifact.
    #[must_use]
    pub fn is_assemblable(&self) -> bool {
        matches!(self, Self::Complete | Self::PartialComplete)
    }

    /// The stage executed while in this state, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::Searching => Some(StageName::Search),
            Self::Summarizing => Some(StageName::Summarize),
            Self::ImageFetching => Some(StageName::Image),
            Self::Synthesizing => Some(StageName::Speech),
            Self::SlideBuilding => Some(StageName::Slide),
            _ => None,
        }
    }

    /// Coarse status as exposed on [`crate::core::Topic`].
    #[must_use]
    pub fn status(&self) -> TopicStatus {
        match self {
            Self::Pending => TopicStatus::Pending,
            Self::Complete => TopicStatus::Complete,
            Self::PartialComplete => TopicStatus::Partial,
            Self::Failed => TopicStatus::Failed,
            _ => TopicStatus::InProgress,
        }
    }
}

impl fmt::Display for TopicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Searching => "searching",
            Self::Summarizing => "summarizing",
            Self::ImageFetching => "image_fetching",
            Self::Synthesizing => "synthesizing",
            Self::SlideBuilding => "slide_building",
            Self::Complete => "complete",
            Self::PartialComplete => "partial_complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Coarse topic status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    /// Not started.
    Pending,
    /// A stage is running.
    InProgress,
    /// Completed with the text-only fallback.
    Partial,
    /// Completed.
    Complete,
    /// Failed.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_name_round_trip() {
        for stage in [
            StageName::Search,
            StageName::Summarize,
            StageName::Narration,
            StageName::Image,
            StageName::Speech,
            StageName::Slide,
            StageName::Document,
            StageName::AudioTrack,
            StageName::Video,
        ] {
            assert_eq!(StageName::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(StageName::parse("bogus"), None);
    }

    #[test]
    fn test_stage_order_follows_pipeline() {
        assert!(StageName::Search < StageName::Summarize);
        assert!(StageName::Image < StageName::Speech);
        assert!(StageName::Slide < StageName::Document);
    }

    #[test]
    fn test_working_states_map_to_stages() {
        let stages: Vec<_> = TopicState::WORKING.iter().filter_map(TopicState::stage).collect();
        assert_eq!(
            stages,
            vec![
                StageName::Search,
                StageName::Summarize,
                StageName::Image,
                StageName::Speech,
                StageName::Slide
            ]
        );
        assert_eq!(TopicState::Complete.stage(), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TopicState::Complete.is_terminal());
        assert!(TopicState::PartialComplete.is_terminal());
        assert!(TopicState::Failed.is_terminal());
        assert!(!TopicState::Synthesizing.is_terminal());
        assert!(!TopicState::Failed.is_assemblable());
        assert!(TopicState::PartialComplete.is_assemblable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(TopicState::Pending.status(), TopicStatus::Pending);
        assert_eq!(TopicState::ImageFetching.status(), TopicStatus::InProgress);
        assert_eq!(TopicState::PartialComplete.status(), TopicStatus::Partial);
        assert_eq!(TopicState::Failed.status(), TopicStatus::Failed);
    }

    #[test]
    fn test_state_serialize() {
        let json = serde_json::to_string(&TopicState::PartialComplete).unwrap();
        assert_eq!(json, r#""partial_complete""#);
        assert_eq!(TopicState::ImageFetching.to_string(), "image_fetching");
    }
}
