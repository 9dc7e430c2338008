//! Positional output layout.
//!
//! Paths depend only on the artifact key, never on timing or content:
//!
//! ```text
//! search/topic_NN.json        text/{intro|outro|topic_NN}.json
//! images/topic_NN.jpg         audio/{intro|outro|topic_NN}.wav
//! slides/{slot}_slide.png     final/{document.json,audio-track.wav,video.mp4}
//! ```

use std::path::{Path, PathBuf};

use crate::core::{ArtifactKey, StageName};

/// File name of the manifest inside the output root.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File name the previous manifest is moved to when kept.
pub const PREVIOUS_MANIFEST_FILE: &str = "manifest.previous.json";

/// Maps artifact keys to locations under an output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Creates a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the manifest.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Location the previous manifest is kept at.
    #[must_use]
    pub fn previous_manifest_path(&self) -> PathBuf {
        self.root.join(PREVIOUS_MANIFEST_FILE)
    }

    /// Path of `key` relative to the root.
    #[must_use]
    pub fn relative_path(key: &ArtifactKey) -> PathBuf {
        let dir = match key.stage {
            StageName::Search => "search",
            StageName::Summarize | StageName::Narration => "text",
            StageName::Image => "images",
            StageName::Speech => "audio",
            StageName::Slide => "slides",
            StageName::Document | StageName::AudioTrack | StageName::Video => "final",
        };
        let stem = match key.stage {
            StageName::Slide => format!("{}_slide", key.slot),
            StageName::Document => "document".to_string(),
            StageName::AudioTrack => "audio-track".to_string(),
            StageName::Video => "video".to_string(),
            _ => key.slot.to_string(),
        };
        let ext = match key.stage {
            StageName::Search
            | StageName::Summarize
            | StageName::Narration
            | StageName::Document => "json",
            StageName::Image => "jpg",
            StageName::Speech | StageName::AudioTrack => "wav",
            StageName::Slide => "png",
            StageName::Video => "mp4",
        };

        let file = if key.seq == 0 {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}_{}.{ext}", key.seq)
        };
        Path::new(dir).join(file)
    }

    /// Absolute path of `key`.
    #[must_use]
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(Self::relative_path(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Slot;

    fn rel(stage: StageName, slot: Slot) -> String {
        OutputLayout::relative_path(&ArtifactKey::new(stage, slot))
            .to_string_lossy()
            .replace('\\', "/")
    }

    #[test]
    fn test_positional_names() {
        assert_eq!(rel(StageName::Speech, Slot::Topic(3)), "audio/topic_03.wav");
        assert_eq!(rel(StageName::Speech, Slot::Intro), "audio/intro.wav");
        assert_eq!(rel(StageName::Image, Slot::Topic(12)), "images/topic_12.jpg");
        assert_eq!(rel(StageName::Slide, Slot::Outro), "slides/outro_slide.png");
        assert_eq!(rel(StageName::Slide, Slot::Topic(1)), "slides/topic_01_slide.png");
        assert_eq!(rel(StageName::Narration, Slot::Intro), "text/intro.json");
    }

    #[test]
    fn test_final_outputs() {
        assert_eq!(rel(StageName::Document, Slot::Final), "final/document.json");
        assert_eq!(rel(StageName::AudioTrack, Slot::Final), "final/audio-track.wav");
        assert_eq!(rel(StageName::Video, Slot::Final), "final/video.mp4");
    }

    #[test]
    fn test_sequence_suffix() {
        let key = ArtifactKey::new(StageName::Speech, Slot::Topic(2)).with_seq(1);
        assert_eq!(
            OutputLayout::relative_path(&key),
            Path::new("audio").join("topic_02_1.wav")
        );
    }

    #[test]
    fn test_same_key_same_path() {
        let layout = OutputLayout::new("/tmp/out");
        let a = ArtifactKey::new(StageName::Search, Slot::Topic(4));
        let b = ArtifactKey::new(StageName::Search, Slot::Topic(4));
        assert_eq!(layout.path_for(&a), layout.path_for(&b));
        assert_eq!(layout.manifest_path(), Path::new("/tmp/out/manifest.json"));
    }
}
