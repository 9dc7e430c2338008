//! Protocol traits for external providers.
//!
//! Implementations classify their own failures with [`StageError`]; the
//! executor only looks at the class. Credentials and client setup belong to
//! the implementations.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::models::{SlideSpec, Snippet, SpeechClip, VideoSegment};
use crate::errors::StageError;

/// Web search.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Runs `query`, returning at most `max_results` hits. An empty list is
    /// not an error here; the search stage decides what empty means.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Snippet>, StageError>;
}

/// Text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Turns a raw summary into bullet lines (one per line).
    async fn summarize(&self, summary: &str) -> Result<String, StageError>;

    /// Writes the narration script from the summary and bullets.
    async fn narrate(&self, summary: &str, bullets: &[String]) -> Result<String, StageError>;

    /// Suggests one or two image search phrases.
    async fn keywords(&self, summary: &str) -> Result<String, StageError>;

    /// Writes the intro narration.
    async fn intro(&self, date: &str, topics: &[String]) -> Result<String, StageError>;

    /// Writes the outro narration.
    async fn outro(&self) -> Result<String, StageError>;
}

/// Image search returning candidate image bytes, best first.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Returns up to `max_candidates` candidate images for `keywords`.
    async fn fetch_candidates(
        &self,
        keywords: &str,
        max_candidates: usize,
    ) -> Result<Vec<Vec<u8>>, StageError>;
}

/// Text to speech.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesizes `text`.
    async fn synthesize(&self, text: &str) -> Result<SpeechClip, StageError>;
}

/// Slide rendering; failures are permanent.
#[async_trait]
pub trait SlideRenderer: Send + Sync {
    /// Renders `slide` to an image at `output`.
    async fn render_slide(&self, slide: &SlideSpec, output: &Path) -> Result<(), StageError>;
}

/// Audio stitching and video encoding; failures are permanent.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Concatenates `clips` in order into one track at `output`.
    async fn stitch_audio(&self, clips: &[PathBuf], output: &Path) -> Result<(), StageError>;

    /// Encodes `segments` over `audio_track` into a video at `output`.
    async fn encode_video(
        &self,
        segments: &[VideoSegment],
        audio_track: &Path,
        output: &Path,
    ) -> Result<(), StageError>;
}
